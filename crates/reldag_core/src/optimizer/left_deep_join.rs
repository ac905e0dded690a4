use reldag_error::{Result, internal};
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_join::JoinType;
use crate::logical::rel_left_deep_join::RelLeftDeepJoin;
use crate::rex::literal::RexLiteral;
use crate::rex::{RexInput, RexScalar, split_conjunction};

/// Get the node a left-deep join chain would replace when rooted at `id`.
///
/// A filter directly over an inner join is the root itself, its condition
/// becomes part of the join condition. Otherwise a single input node
/// consuming a join roots the chain at that join.
pub fn left_deep_join_root(dag: &RelAlgDag, id: NodeId) -> Option<NodeId> {
    let node = dag.node(id);
    if node.inputs.len() != 1 {
        return None;
    }
    let input = node.inputs[0];
    let RelAlgOperator::Join(join) = &dag.node(input).op else {
        return None;
    };
    if matches!(node.op, RelAlgOperator::Filter(_)) && join.join_type == JoinType::Inner {
        return Some(id);
    }
    Some(input)
}

/// Flattens chains of joins nesting to the left into a single multi-way
/// join node.
///
/// The chain follows the left input of each join as long as that input is a
/// join only consumed by the chain.
#[derive(Debug, Default)]
pub struct CreateLeftDeepJoins;

impl OptimizeRule for CreateLeftDeepJoins {
    fn optimize(&mut self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let mut roots: Vec<NodeId> = Vec::new();
        for id in dag.order() {
            if let Some(root) = left_deep_join_root(dag, *id) {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }

        for root in roots {
            if !dag.is_live(root) {
                continue;
            }
            self.create_left_deep_join(ctx, dag, root)?;
        }

        Ok(())
    }
}

impl CreateLeftDeepJoins {
    fn create_left_deep_join(
        &self,
        ctx: &mut OptimizerContext,
        dag: &mut RelAlgDag,
        root: NodeId,
    ) -> Result<()> {
        let (filter, top_join) = match &dag.node(root).op {
            RelAlgOperator::Filter(_) => {
                let join = dag.node(root).single_input()?;
                if dag.use_count(join) == 1 {
                    (Some(root), join)
                } else {
                    (None, join)
                }
            }
            _ => (None, root),
        };

        // Joins from the top of the chain down.
        let mut joins = vec![top_join];
        let mut cur = top_join;
        loop {
            let left = dag.node(cur).input(0)?;
            if matches!(dag.node(left).op, RelAlgOperator::Join(_)) && dag.use_count(left) == 1 {
                joins.push(left);
                cur = left;
            } else {
                break;
            }
        }

        let mut inputs = vec![dag.node(cur).input(0)?];
        let mut join_types = Vec::with_capacity(joins.len());
        let mut outer_conditions = Vec::with_capacity(joins.len());
        let mut conjuncts = Vec::new();

        for join_id in joins.iter().rev() {
            let node = dag.node(*join_id);
            let RelAlgOperator::Join(join) = &node.op else {
                continue;
            };
            inputs.push(node.input(1)?);
            join_types.push(join.join_type);
            match join.join_type {
                JoinType::Inner => {
                    split_conjunction(join.condition.clone(), &mut conjuncts);
                    outer_conditions.push(None);
                }
                JoinType::Left => outer_conditions.push(Some(join.condition.clone())),
            }
        }

        if let Some(filter) = filter {
            if let RelAlgOperator::Filter(node) = &dag.node(filter).op {
                split_conjunction(node.condition.clone(), &mut conjuncts);
            }
        }
        conjuncts.retain(|expr| !expr.is_literal_true());
        let mut condition = RexScalar::and_all(conjuncts)
            .unwrap_or_else(|| RexScalar::Literal(RexLiteral::boolean(true)));

        // Each join's output is a prefix of the flattened output, so a
        // reference to a chain join keeps its index.
        let mut ldj_output = Vec::new();
        for input in &inputs {
            for idx in 0..dag.output_size(*input)? {
                ldj_output.push(RexInput::new(*input, idx));
            }
        }
        let rebind = |expr: &mut RexScalar| {
            expr.for_each_input_mut(|input| {
                if joins.contains(&input.source) {
                    *input = *ldj_output.get(input.index).ok_or_else(|| {
                        internal!("Column {} out of range for left-deep join", input.index)
                    })?;
                }
                Ok(())
            })
        };
        rebind(&mut condition)?;
        for outer in outer_conditions.iter_mut().flatten() {
            rebind(outer)?;
        }

        let replaced: Vec<NodeId> = filter.into_iter().chain(joins.iter().copied()).collect();
        let original_ids = replaced.iter().map(|id| dag.node(*id).id).collect();

        debug!(
            %root,
            inputs = inputs.len(),
            "creating left-deep join"
        );

        let ldj = RelAlgNode::new(
            ctx.ids.next_id(),
            inputs,
            RelAlgOperator::LeftDeepJoin(RelLeftDeepJoin {
                condition,
                outer_conditions,
                join_types,
                original_ids,
            }),
        );
        // The node at the top of the chain gives up its slot.
        let top = filter.unwrap_or(top_join);
        let ldj_id = dag.alloc(ldj);
        dag.replace_in_order(top, ldj_id)?;

        // Only the top join is visible outside the chain.
        let live: Vec<NodeId> = dag.order().to_vec();
        for node in live {
            if node == ldj_id {
                continue;
            }
            dag.node_mut(node).for_each_expr_mut(|expr| {
                for inner in &joins[1..] {
                    expr.rebind_inputs(*inner, top_join);
                }
                Ok(())
            })?;
        }

        for old in replaced {
            dag.replace_input_everywhere(old, ldj_id, None)?;
            if old != top {
                dag.remove(old);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        apply_rule, col, eq, filter, join, lit, lit_true, project, project_of, scan,
    };

    fn ldj_of(dag: &RelAlgDag, id: NodeId) -> &RelLeftDeepJoin {
        match &dag.node(id).op {
            RelAlgOperator::LeftDeepJoin(ldj) => ldj,
            other => panic!("expected left-deep join, got {other:?}"),
        }
    }

    #[test]
    fn root_detection() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let inner = join(&mut dag, a, b, lit_true(), JoinType::Inner);
        let f = filter(&mut dag, inner, eq(col(a, 0), col(b, 0)));
        let left = join(&mut dag, a, b, lit_true(), JoinType::Left);
        let f_left = filter(&mut dag, left, lit_true());
        let p = project(&mut dag, left, vec![col(a, 0)]);

        assert_eq!(Some(f), left_deep_join_root(&dag, f));
        assert_eq!(Some(left), left_deep_join_root(&dag, f_left));
        assert_eq!(Some(left), left_deep_join_root(&dag, p));
        assert_eq!(None, left_deep_join_root(&dag, inner));
        assert_eq!(None, left_deep_join_root(&dag, a));
    }

    #[test]
    fn filtered_chain_flattened() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let c = scan(&mut dag, "c", &["z"]);
        let j1 = join(&mut dag, a, b, eq(col(a, 0), col(b, 0)), JoinType::Inner);
        let j2 = join(&mut dag, j1, c, lit_true(), JoinType::Inner);
        let f = filter(&mut dag, j2, eq(col(j1, 1), col(c, 0)));
        let p = project(&mut dag, f, vec![col(f, 2), col(f, 0)]);

        apply_rule(&mut CreateLeftDeepJoins, &mut dag).unwrap();

        assert_eq!(5, dag.len());
        let ldj_id = dag.order()[3];
        assert_eq!(&[a, b, c, ldj_id, p], dag.order());
        assert_eq!(vec![a, b, c], dag.node(ldj_id).inputs);

        let ldj = ldj_of(&dag, ldj_id);
        assert_eq!(vec![JoinType::Inner, JoinType::Inner], ldj.join_types);
        assert_eq!(vec![None, None], ldj.outer_conditions);
        assert_eq!(
            RexScalar::and_all(vec![eq(col(a, 0), col(b, 0)), eq(col(b, 0), col(c, 0))]).unwrap(),
            ldj.condition
        );
        assert_eq!(vec![5, 4, 3], ldj.original_ids);

        assert_eq!(vec![ldj_id], dag.node(p).inputs);
        assert_eq!(vec![col(c, 0), col(a, 0)], project_of(&dag, p).exprs);
    }

    #[test]
    fn left_join_condition_kept_per_level() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let c = scan(&mut dag, "c", &["z"]);
        let j1 = join(&mut dag, a, b, eq(col(a, 0), col(b, 0)), JoinType::Inner);
        let j2 = join(&mut dag, j1, c, eq(col(j1, 0), col(c, 0)), JoinType::Left);
        let p = project(&mut dag, j2, vec![col(c, 0), lit(1)]);

        apply_rule(&mut CreateLeftDeepJoins, &mut dag).unwrap();

        let ldj_id = dag.node(p).inputs[0];
        assert_eq!(&[a, b, c, ldj_id, p], dag.order());
        let ldj = ldj_of(&dag, ldj_id);
        assert_eq!(vec![JoinType::Inner, JoinType::Left], ldj.join_types);
        assert_eq!(
            vec![None, Some(eq(col(a, 0), col(c, 0)))],
            ldj.outer_conditions
        );
        assert_eq!(eq(col(a, 0), col(b, 0)), ldj.condition);
        assert_eq!(vec![4, 3], ldj.original_ids);
    }

    #[test]
    fn shared_inner_join_stops_chain() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let c = scan(&mut dag, "c", &["z"]);
        let j1 = join(&mut dag, a, b, lit_true(), JoinType::Inner);
        let j2 = join(&mut dag, j1, c, lit_true(), JoinType::Inner);
        let other = project(&mut dag, j1, vec![col(a, 0)]);
        let p = project(&mut dag, j2, vec![col(b, 0)]);

        apply_rule(&mut CreateLeftDeepJoins, &mut dag).unwrap();

        // Both joins get flattened separately.
        assert!(!dag.is_live(j1) && !dag.is_live(j2));
        let outer = dag.node(p).inputs[0];
        let inner = dag.node(other).inputs[0];
        assert_eq!(vec![inner, c], dag.node(outer).inputs);
        assert_eq!(vec![a, b], dag.node(inner).inputs);
        assert_eq!(lit_true(), ldj_of(&dag, outer).condition);
    }

    #[test]
    fn consumers_of_inner_join_columns_rebound() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let c = scan(&mut dag, "c", &["z"]);
        let d = scan(&mut dag, "d", &["w"]);
        let j1 = join(&mut dag, a, b, eq(col(a, 0), col(b, 0)), JoinType::Inner);
        let j2 = join(&mut dag, j1, c, eq(col(j1, 1), col(c, 0)), JoinType::Inner);
        let j3 = join(&mut dag, j2, d, eq(col(j2, 2), col(d, 0)), JoinType::Left);
        let p = project(&mut dag, j3, vec![col(j2, 1), col(d, 0)]);

        apply_rule(&mut CreateLeftDeepJoins, &mut dag).unwrap();

        let ldj_id = dag.node(p).inputs[0];
        assert_eq!(vec![a, b, c, d], dag.node(ldj_id).inputs);
        let ldj = ldj_of(&dag, ldj_id);
        assert_eq!(
            RexScalar::and_all(vec![eq(col(a, 0), col(b, 0)), eq(col(b, 0), col(c, 0))]).unwrap(),
            ldj.condition
        );
        assert_eq!(
            vec![None, None, Some(eq(col(c, 0), col(d, 0)))],
            ldj.outer_conditions
        );
        assert_eq!(vec![col(b, 0), col(d, 0)], project_of(&dag, p).exprs);
    }

    #[test]
    fn join_over_flattened_chain_references_it_by_id() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x"]);
        let b = scan(&mut dag, "b", &["y"]);
        let c = scan(&mut dag, "c", &["z"]);
        let j1 = join(&mut dag, a, b, eq(col(a, 0), col(b, 0)), JoinType::Inner);
        let other = project(&mut dag, j1, vec![col(b, 0)]);
        let j2 = join(&mut dag, j1, c, eq(col(j1, 1), col(c, 0)), JoinType::Inner);
        let p = project(&mut dag, j2, vec![col(j1, 0)]);

        apply_rule(&mut CreateLeftDeepJoins, &mut dag).unwrap();

        let inner = dag.node(other).inputs[0];
        let outer = dag.node(p).inputs[0];
        assert_eq!(vec![inner, c], dag.node(outer).inputs);
        assert_eq!(
            eq(col(inner, 1), col(c, 0)),
            ldj_of(&dag, outer).condition
        );
        assert_eq!(vec![col(inner, 0)], project_of(&dag, p).exprs);
        assert_eq!(vec![col(b, 0)], project_of(&dag, other).exprs);
    }
}

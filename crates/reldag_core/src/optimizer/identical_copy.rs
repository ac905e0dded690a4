use std::collections::HashMap;

use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;
use crate::rex::RexScalar;

/// Bypasses projects that only forward the columns of their input.
///
/// Projects that rename columns are kept since the names are part of the
/// result, as is the root and any project targeted by an UPDATE or DELETE.
/// A project permuting its input is only removed when no consumer depends on
/// column positions, i.e. pass through nodes and grouping aggregates.
#[derive(Debug, Default)]
pub struct EliminateIdenticalCopy;

impl OptimizeRule for EliminateIdenticalCopy {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let root = dag.root();
        let order = dag.order().to_vec();

        for id in order {
            if Some(id) == root {
                continue;
            }
            let RelAlgOperator::Project(proj) = &dag.node(id).op else {
                continue;
            };
            if proj.is_manipulation_target()
                || !dag.project_is_identity(id)?
                || dag.project_is_renaming(id)?
            {
                continue;
            }

            let mapping: HashMap<usize, usize> = proj
                .exprs
                .iter()
                .enumerate()
                .filter_map(|(idx, expr)| match expr {
                    RexScalar::Input(input) => Some((idx, input.index)),
                    _ => None,
                })
                .collect();
            let is_permutation = mapping.iter().any(|(from, to)| from != to);
            if is_permutation && has_pass_through_consumer(dag, id) {
                continue;
            }

            debug!(%id, "bypassing identical copy");
            dag.bypass(id, Some(&mapping))?;
        }

        Ok(())
    }
}

fn has_pass_through_consumer(dag: &RelAlgDag, id: NodeId) -> bool {
    dag.consumers(id)
        .into_iter()
        .any(|consumer| match &dag.node(consumer).op {
            RelAlgOperator::Filter(_)
            | RelAlgOperator::Sort(_)
            | RelAlgOperator::Union(_)
            | RelAlgOperator::Modify(_) => true,
            RelAlgOperator::Aggregate(agg) => agg.group_count > 0,
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::node::RelAlgNode;
    use crate::logical::rel_project::RelProject;
    use crate::rex::agg::AggKind;
    use crate::testutil::{
        agg, aggregate, apply_rule, col, filter, lit, lit_true, project, project_of, scan,
    };

    fn named_project(
        dag: &mut RelAlgDag,
        input: NodeId,
        exprs: Vec<RexScalar>,
        fields: &[&str],
    ) -> NodeId {
        let id = dag.arena_len() as u32;
        dag.push(RelAlgNode::new(
            id,
            vec![input],
            RelAlgOperator::Project(RelProject::new(
                exprs,
                fields.iter().map(|f| f.to_string()).collect(),
            )),
        ))
    }

    #[test]
    fn identity_project_bypassed() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let copy = named_project(&mut dag, t, vec![col(t, 0), col(t, 1)], &["a", "b"]);
        let top = project(&mut dag, copy, vec![col(copy, 1), lit(3)]);

        apply_rule(&mut EliminateIdenticalCopy, &mut dag).unwrap();

        assert_eq!(&[t, top], dag.order());
        assert_eq!(vec![col(t, 1), lit(3)], project_of(&dag, top).exprs);
    }

    #[test]
    fn permutation_remaps_aggregate_operands() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let copy = named_project(&mut dag, t, vec![col(t, 1), col(t, 0)], &["b", "a"]);
        let agg_node = aggregate(&mut dag, copy, 0, vec![agg(AggKind::Sum, vec![1])]);

        apply_rule(&mut EliminateIdenticalCopy, &mut dag).unwrap();

        assert_eq!(&[t, agg_node], dag.order());
        let RelAlgOperator::Aggregate(node) = &dag.node(agg_node).op else {
            panic!("expected aggregate");
        };
        assert_eq!(vec![0], node.aggs[0].operands);
    }

    #[test]
    fn permutation_under_filter_kept() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let copy = named_project(&mut dag, t, vec![col(t, 1), col(t, 0)], &["b", "a"]);
        let f = filter(&mut dag, copy, lit_true());
        let top = project(&mut dag, f, vec![col(f, 0)]);

        apply_rule(&mut EliminateIdenticalCopy, &mut dag).unwrap();

        assert_eq!(&[t, copy, f, top], dag.order());
    }

    #[test]
    fn renaming_and_root_kept() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let renamed = named_project(&mut dag, t, vec![col(t, 0), col(t, 1)], &["x", "b"]);
        let root = named_project(
            &mut dag,
            renamed,
            vec![col(renamed, 0), col(renamed, 1)],
            &["x", "b"],
        );

        apply_rule(&mut EliminateIdenticalCopy, &mut dag).unwrap();

        assert_eq!(&[t, renamed, root], dag.order());
    }
}

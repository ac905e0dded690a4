use std::collections::{BTreeSet, HashMap};

use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;

/// Drops project columns nothing reads.
///
/// A column is read when an expression references it, or when a consumer
/// depends on its position (group keys and aggregate operands, sort keys,
/// table function inputs). Pass through nodes and joins forward the question
/// to their own consumers. Unions and modifies read everything, as does the
/// root.
///
/// Projects are visited from the root down so pruning a consumer can expose
/// dead columns in its inputs.
#[derive(Debug, Default)]
pub struct EliminateDeadColumns;

impl OptimizeRule for EliminateDeadColumns {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let root = dag.root();
        let order: Vec<_> = dag.order().iter().rev().copied().collect();

        for id in order {
            let RelAlgOperator::Project(proj) = &dag.node(id).op else {
                continue;
            };
            let width = proj.exprs.len();
            if proj.is_manipulation_target() || width == 0 {
                continue;
            }

            let Some(used) = output_usage(dag, id, root, 0)? else {
                continue;
            };
            let mut keep: Vec<usize> = used.into_iter().filter(|idx| *idx < width).collect();
            if keep.is_empty() {
                // Keep one column around, consumers still need rows.
                keep.push(0);
            }
            if keep.len() == width {
                continue;
            }

            debug!(%id, before = width, after = keep.len(), "removing dead columns");
            let mapping: HashMap<usize, usize> = keep
                .iter()
                .enumerate()
                .map(|(new, old)| (*old, new))
                .collect();

            if let RelAlgOperator::Project(proj) = &mut dag.node_mut(id).op {
                proj.exprs = keep.iter().map(|idx| proj.exprs[*idx].clone()).collect();
                proj.fields = keep.iter().map(|idx| proj.fields[*idx].clone()).collect();
            }

            remap_columns(dag, id, &mapping, width)?;
        }

        Ok(())
    }
}

/// Output columns of `id` read by the rest of the DAG. `None` if all of them
/// are.
fn output_usage(
    dag: &RelAlgDag,
    id: NodeId,
    root: Option<NodeId>,
    depth: usize,
) -> Result<Option<BTreeSet<usize>>> {
    if Some(id) == root || depth > dag.arena_len() {
        return Ok(None);
    }

    let mut used = BTreeSet::new();
    for (_, node) in dag.nodes() {
        node.for_each_expr(|expr| {
            expr.for_each_input(|input| {
                if input.source == id {
                    used.insert(input.index);
                }
                Ok(())
            })
        })?;
    }

    for consumer in dag.consumers(id) {
        let node = dag.node(consumer);
        match &node.op {
            RelAlgOperator::Project(_) => (),
            RelAlgOperator::Filter(_) => match output_usage(dag, consumer, root, depth + 1)? {
                Some(cols) => used.extend(cols),
                None => return Ok(None),
            },
            RelAlgOperator::Sort(sort) => {
                used.extend(sort.collation.iter().map(|field| field.field));
                match output_usage(dag, consumer, root, depth + 1)? {
                    Some(cols) => used.extend(cols),
                    None => return Ok(None),
                }
            }
            RelAlgOperator::Aggregate(agg) => {
                used.extend(0..agg.group_count);
                used.extend(agg.aggs.iter().flat_map(|agg| agg.operands.iter().copied()));
            }
            RelAlgOperator::TableFunction(func) => used.extend(func.col_inputs.iter().copied()),
            RelAlgOperator::Join(_) => {
                if node.inputs.iter().filter(|input| **input == id).count() != 1 {
                    return Ok(None);
                }
                let Some(join_cols) = output_usage(dag, consumer, root, depth + 1)? else {
                    return Ok(None);
                };
                let mut offset = 0;
                for input in &node.inputs {
                    let size = dag.output_size(*input)?;
                    if *input == id {
                        used.extend(
                            join_cols
                                .iter()
                                .filter(|col| **col >= offset && **col < offset + size)
                                .map(|col| col - offset),
                        );
                        break;
                    }
                    offset += size;
                }
            }
            _ => return Ok(None),
        }
    }

    Ok(Some(used))
}

/// Rewrite everything reading the output of `id` after its columns were
/// renumbered according to `mapping`.
///
/// `old_width` is the number of columns `id` had before.
fn remap_columns(
    dag: &mut RelAlgDag,
    id: NodeId,
    mapping: &HashMap<usize, usize>,
    old_width: usize,
) -> Result<()> {
    let live: Vec<_> = dag.order().to_vec();
    for node in live {
        dag.replace_input(node, id, id, Some(mapping))?;
    }

    for consumer in dag.consumers(id) {
        match &dag.node(consumer).op {
            RelAlgOperator::Filter(_) | RelAlgOperator::Sort(_) => {
                remap_columns(dag, consumer, mapping, old_width)?;
            }
            RelAlgOperator::Join(_) => {
                let inputs = dag.node(consumer).inputs.clone();
                let mut join_mapping = HashMap::new();
                let mut old_offset = 0;
                let mut new_offset = 0;
                for input in inputs {
                    let new_size = dag.output_size(input)?;
                    if input == id {
                        for (old, new) in mapping {
                            join_mapping.insert(old_offset + old, new_offset + new);
                        }
                        old_offset += old_width;
                    } else {
                        for col in 0..new_size {
                            join_mapping.insert(old_offset + col, new_offset + col);
                        }
                        old_offset += new_size;
                    }
                    new_offset += new_size;
                }
                remap_columns(dag, consumer, &join_mapping, old_offset)?;
            }
            _ => (),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::rel_join::JoinType;
    use crate::rex::agg::AggKind;
    use crate::testutil::{
        agg, aggregate, apply_rule, col, eq, filter, join, lit, project, project_of, scan, sort,
    };

    #[test]
    fn unused_project_columns_removed() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b", "c"]);
        let p = project(&mut dag, t, vec![col(t, 0), col(t, 1), col(t, 2)]);
        let top = project(&mut dag, p, vec![col(p, 2), col(p, 0)]);

        apply_rule(&mut EliminateDeadColumns, &mut dag).unwrap();

        assert_eq!(vec![col(t, 0), col(t, 2)], project_of(&dag, p).exprs);
        assert_eq!(vec!["p0".to_string(), "p2".to_string()], project_of(&dag, p).fields);
        assert_eq!(vec![col(p, 1), col(p, 0)], project_of(&dag, top).exprs);
        // Root keeps everything.
        assert_eq!(2, project_of(&dag, top).exprs.len());
    }

    #[test]
    fn aggregate_operands_remapped() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b", "c"]);
        let p = project(&mut dag, t, vec![col(t, 0), lit(1), col(t, 2)]);
        let a = aggregate(&mut dag, p, 1, vec![agg(AggKind::Sum, vec![2])]);

        apply_rule(&mut EliminateDeadColumns, &mut dag).unwrap();

        assert_eq!(vec![col(t, 0), col(t, 2)], project_of(&dag, p).exprs);
        let RelAlgOperator::Aggregate(node) = &dag.node(a).op else {
            panic!("expected aggregate");
        };
        assert_eq!(vec![1], node.aggs[0].operands);
    }

    #[test]
    fn pass_through_consumers_remapped() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b", "c"]);
        let p = project(&mut dag, t, vec![col(t, 0), col(t, 1), col(t, 2)]);
        let f = filter(&mut dag, p, eq(col(p, 2), lit(3)));
        let s = sort(&mut dag, f, 2, None);
        let top = project(&mut dag, s, vec![col(s, 0)]);

        apply_rule(&mut EliminateDeadColumns, &mut dag).unwrap();

        assert_eq!(vec![col(t, 0), col(t, 2)], project_of(&dag, p).exprs);
        let RelAlgOperator::Filter(filter) = &dag.node(f).op else {
            panic!("expected filter");
        };
        assert_eq!(eq(col(p, 1), lit(3)), filter.condition);
        let RelAlgOperator::Sort(sort) = &dag.node(s).op else {
            panic!("expected sort");
        };
        assert_eq!(1, sort.collation[0].field);
        assert_eq!(vec![col(s, 0)], project_of(&dag, top).exprs);
    }

    #[test]
    fn join_shifts_right_side() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x", "y"]);
        let b = scan(&mut dag, "b", &["z"]);
        let p = project(&mut dag, a, vec![col(a, 0), col(a, 1)]);
        let j = join(&mut dag, p, b, eq(col(p, 0), col(b, 0)), JoinType::Inner);
        let f = filter(&mut dag, j, eq(col(p, 0), lit(1)));
        let top = project(&mut dag, f, vec![col(f, 2), col(f, 0)]);

        apply_rule(&mut EliminateDeadColumns, &mut dag).unwrap();

        assert_eq!(vec![col(a, 0)], project_of(&dag, p).exprs);
        assert_eq!(vec![col(f, 1), col(f, 0)], project_of(&dag, top).exprs);
    }

    #[test]
    fn nested_join_references_remapped() {
        let mut dag = RelAlgDag::new();
        let a = scan(&mut dag, "a", &["x", "y", "z"]);
        let b = scan(&mut dag, "b", &["w"]);
        let c = scan(&mut dag, "c", &["v"]);
        let p = project(&mut dag, a, vec![col(a, 0), col(a, 1), col(a, 2)]);
        let j1 = join(&mut dag, p, b, eq(col(p, 2), col(b, 0)), JoinType::Inner);
        let j2 = join(&mut dag, j1, c, eq(col(j1, 3), col(c, 0)), JoinType::Inner);
        let top = project(&mut dag, j2, vec![col(j1, 0), col(c, 0)]);

        apply_rule(&mut EliminateDeadColumns, &mut dag).unwrap();

        assert_eq!(vec![col(a, 0), col(a, 2)], project_of(&dag, p).exprs);
        let condition = |id| match &dag.node(id).op {
            RelAlgOperator::Join(join) => join.condition.clone(),
            other => panic!("expected join, got {other:?}"),
        };
        assert_eq!(eq(col(p, 1), col(b, 0)), condition(j1));
        assert_eq!(eq(col(j1, 2), col(c, 0)), condition(j2));
        assert_eq!(vec![col(j1, 0), col(c, 0)], project_of(&dag, top).exprs);
    }
}

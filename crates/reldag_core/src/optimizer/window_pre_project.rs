use std::collections::{BTreeSet, HashMap};

use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_project::RelProject;
use crate::rex::RexScalar;

/// Narrows the input of window function projects to the columns they read.
///
/// Only used in cluster mode, where window functions get evaluated on
/// materialized input and wide inputs are expensive to move around.
#[derive(Debug, Default)]
pub struct WindowPreProject;

impl OptimizeRule for WindowPreProject {
    fn optimize(&mut self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        for id in order {
            let RelAlgOperator::Project(proj) = &dag.node(id).op else {
                continue;
            };
            if !proj.has_window_function_expr() {
                continue;
            }
            let input = dag.node(id).single_input()?;

            let mut used = BTreeSet::new();
            let mut foreign = false;
            for expr in &proj.exprs {
                expr.for_each_input(|col| {
                    if col.source == input {
                        used.insert(col.index);
                    } else {
                        foreign = true;
                    }
                    Ok(())
                })?;
            }
            if foreign || used.is_empty() {
                debug!(%id, "window project reads columns outside its input, skipping");
                continue;
            }
            if used.len() == dag.output_size(input)? {
                continue;
            }

            self.insert_pre_project(ctx, dag, id, input, used)?;
        }
        Ok(())
    }
}

impl WindowPreProject {
    fn insert_pre_project(
        &self,
        ctx: &mut OptimizerContext,
        dag: &mut RelAlgDag,
        id: NodeId,
        input: NodeId,
        used: BTreeSet<usize>,
    ) -> Result<()> {
        let mut exprs = Vec::with_capacity(used.len());
        let mut mapping = HashMap::with_capacity(used.len());
        for (new_idx, old_idx) in used.into_iter().enumerate() {
            exprs.push(RexScalar::input(input, old_idx));
            mapping.insert(old_idx, new_idx);
        }
        let fields = vec![String::new(); exprs.len()];

        debug!(%id, columns = exprs.len(), "adding pre-project for window functions");
        let pre = RelAlgNode::new(
            ctx.ids.next_id(),
            vec![input],
            RelAlgOperator::Project(RelProject::new(exprs, fields)),
        );
        let pre_id = dag.insert_before(id, pre)?;
        dag.replace_input(id, input, pre_id, Some(&mapping))
    }
}

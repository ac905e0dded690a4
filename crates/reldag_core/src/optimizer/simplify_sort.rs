use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;

/// Removes sorts that get resorted on an equivalent collation.
///
/// Only plain sorts (no limit or offset) with a single consumer are removed,
/// and only when the later sort reads from them through simple projects.
#[derive(Debug, Default)]
pub struct SimplifySort;

impl OptimizeRule for SimplifySort {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        let mut prev_sort: Option<NodeId> = None;

        for id in order {
            let node = dag.node(id);
            if matches!(node.op, RelAlgOperator::Sort(_)) {
                if let Some(prev) = prev_sort {
                    if self.is_redundant(dag, prev, id)? {
                        debug!(%prev, %id, "removing redundant sort");
                        dag.bypass(prev, None)?;
                    }
                }
                prev_sort = Some(id);
            } else if !matches!(&node.op, RelAlgOperator::Project(proj) if proj.is_simple()) {
                prev_sort = None;
            }
        }

        Ok(())
    }
}

impl SimplifySort {
    fn is_redundant(&self, dag: &RelAlgDag, prev: NodeId, sort: NodeId) -> Result<bool> {
        let RelAlgOperator::Sort(prev_sort) = &dag.node(prev).op else {
            return Ok(false);
        };
        if !prev_sort.is_plain() || dag.use_count(prev) != 1 {
            return Ok(false);
        }

        // The later sort has to read from the earlier one.
        let mut cur = dag.node(sort).single_input()?;
        while cur != prev {
            match &dag.node(cur).op {
                RelAlgOperator::Project(proj) if proj.is_simple() => {
                    cur = dag.node(cur).single_input()?;
                }
                _ => return Ok(false),
            }
        }

        dag.has_equiv_collation_of(prev, sort)
    }
}

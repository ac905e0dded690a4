use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;
use crate::rex::{RexScalar, split_conjunction};

/// Merges a filter into the filter consuming it.
///
/// The inner filter must not have any other consumer. The merged condition
/// is the conjunction of both conditions.
#[derive(Debug, Default)]
pub struct FoldFilters;

impl OptimizeRule for FoldFilters {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        for id in order {
            if !matches!(dag.node(id).op, RelAlgOperator::Filter(_)) {
                continue;
            }
            let inner = dag.node(id).single_input()?;
            let RelAlgOperator::Filter(inner_filter) = &dag.node(inner).op else {
                continue;
            };
            if dag.use_count(inner) != 1 {
                continue;
            }

            debug!(%inner, outer = %id, "folding filters");
            let inner_condition = inner_filter.condition.clone();
            let inner_input = dag.node(inner).single_input()?;
            dag.replace_input(id, inner, inner_input, None)?;
            merge_condition(dag, id, inner_condition);
            dag.remove(inner);
        }
        Ok(())
    }
}

fn merge_condition(dag: &mut RelAlgDag, id: NodeId, inner: RexScalar) {
    if let RelAlgOperator::Filter(filter) = &mut dag.node_mut(id).op {
        let mut conjuncts = Vec::new();
        split_conjunction(inner, &mut conjuncts);
        split_conjunction(filter.condition.clone(), &mut conjuncts);
        if let Some(condition) = RexScalar::and_all(conjuncts) {
            filter.condition = condition;
        }
    }
}

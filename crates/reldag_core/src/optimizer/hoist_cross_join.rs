use std::collections::HashSet;

use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;
use crate::logical::rel_join::JoinType;
use crate::rex::{RexInput, RexScalar, split_conjunction};

/// Moves join predicates out of a filter sitting on top of a cross join.
///
/// Conjuncts referencing both sides of an inner join with a literal TRUE
/// condition become the join condition. A filter left without conjuncts is
/// removed.
#[derive(Debug, Default)]
pub struct HoistCrossJoinCondition;

impl OptimizeRule for HoistCrossJoinCondition {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        for id in order {
            let RelAlgOperator::Filter(filter) = &dag.node(id).op else {
                continue;
            };
            let join_id = dag.node(id).single_input()?;
            let join_node = dag.node(join_id);
            let RelAlgOperator::Join(join) = &join_node.op else {
                continue;
            };
            if join.join_type != JoinType::Inner
                || !join.condition.is_literal_true()
                || dag.use_count(join_id) != 1
            {
                continue;
            }

            let left = input_columns(dag, join_node.input(0)?)?;
            let right = input_columns(dag, join_node.input(1)?)?;

            let mut conjuncts = Vec::new();
            split_conjunction(filter.condition.clone(), &mut conjuncts);
            let (join_conds, remaining): (Vec<_>, Vec<_>) = conjuncts
                .into_iter()
                .partition(|expr| references_both(expr, &left, &right));
            if join_conds.is_empty() {
                continue;
            }

            debug!(
                filter = %id,
                join = %join_id,
                hoisted = join_conds.len(),
                "hoisting filter conditions into cross join"
            );
            if let (RelAlgOperator::Join(join), Some(condition)) = (
                &mut dag.node_mut(join_id).op,
                RexScalar::and_all(join_conds),
            ) {
                join.condition = condition;
            }

            match RexScalar::and_all(remaining) {
                Some(condition) => {
                    if let RelAlgOperator::Filter(filter) = &mut dag.node_mut(id).op {
                        filter.condition = condition;
                    }
                }
                None => dag.bypass(id, None)?,
            }
        }
        Ok(())
    }
}

fn input_columns(dag: &RelAlgDag, input: NodeId) -> Result<HashSet<RexInput>> {
    Ok((0..dag.output_size(input)?)
        .map(|idx| RexInput::new(input, idx))
        .collect())
}

fn references_both(
    expr: &RexScalar,
    left: &HashSet<RexInput>,
    right: &HashSet<RexInput>,
) -> bool {
    let mut inputs = Vec::new();
    expr.collect_inputs(&mut inputs);
    inputs.iter().any(|input| left.contains(input))
        && inputs.iter().any(|input| right.contains(input))
}

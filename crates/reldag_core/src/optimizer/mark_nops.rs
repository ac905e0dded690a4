use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::RelAlgDag;
use crate::logical::node::RelAlgOperator;

/// Marks aggregates that regroup the output of an identical grouping.
///
/// Both aggregates must be pure groupings (no aggregate expressions) with the
/// same number of keys. Marked nodes stay in the DAG.
#[derive(Debug, Default)]
pub struct MarkNops;

impl OptimizeRule for MarkNops {
    fn optimize(&mut self, _ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        for id in order {
            let node = dag.node(id);
            let RelAlgOperator::Aggregate(agg) = &node.op else {
                continue;
            };
            if !agg.aggs.is_empty() {
                continue;
            }
            let input = node.single_input()?;
            let is_nop = match &dag.node(input).op {
                RelAlgOperator::Aggregate(input_agg) => {
                    input_agg.aggs.is_empty() && input_agg.group_count == agg.group_count
                }
                _ => false,
            };

            if is_nop {
                debug!(%id, "marking aggregate as nop");
                if let RelAlgOperator::Aggregate(agg) = &mut dag.node_mut(id).op {
                    agg.is_nop = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::dag::NodeId;
    use crate::rex::agg::AggKind;
    use crate::testutil::{agg, aggregate, apply_rule, scan};

    fn is_nop(dag: &RelAlgDag, id: NodeId) -> bool {
        match &dag.node(id).op {
            RelAlgOperator::Aggregate(agg) => agg.is_nop,
            _ => false,
        }
    }

    #[test]
    fn regrouping_is_nop() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let inner = aggregate(&mut dag, t, 1, Vec::new());
        let outer = aggregate(&mut dag, inner, 1, Vec::new());

        apply_rule(&mut MarkNops, &mut dag).unwrap();

        assert!(is_nop(&dag, outer));
        assert!(!is_nop(&dag, inner));
        assert_eq!(3, dag.len());
    }

    #[test]
    fn aggregates_are_not_nop() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let inner = aggregate(&mut dag, t, 1, vec![agg(AggKind::Count, Vec::new())]);
        let outer = aggregate(&mut dag, inner, 1, Vec::new());
        let different_keys = aggregate(&mut dag, outer, 2, Vec::new());

        apply_rule(&mut MarkNops, &mut dag).unwrap();

        assert!(!is_nop(&dag, outer));
        assert!(!is_nop(&dag, different_keys));
    }
}

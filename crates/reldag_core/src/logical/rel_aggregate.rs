use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::rex::agg::RexAgg;

/// Grouped aggregate.
///
/// The first `group_count` input columns are the group keys. Output is the
/// group keys followed by one column per aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct RelAggregate {
    pub group_count: usize,
    pub aggs: Vec<RexAgg>,
    pub fields: Vec<String>,
    /// Set when this aggregate regroups the output of an identical aggregate
    /// and can be skipped during execution.
    pub is_nop: bool,
}

impl RelAggregate {
    pub fn output_size(&self) -> usize {
        self.group_count + self.aggs.len()
    }
}

impl Explainable for RelAggregate {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = EntryBuilder::new("Aggregate", conf)
            .with_value("group_count", self.group_count)
            .with_values("aggregates", &self.aggs)
            .with_values_if_verbose("fields", &self.fields);
        if self.is_nop {
            ent = ent.with_value("nop", true);
        }
        ent.build()
    }
}

impl RelNode for RelAggregate {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        Ok(())
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, _func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        Ok(())
    }
}

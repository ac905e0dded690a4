use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

#[derive(Debug, Clone, PartialEq)]
pub struct RelFilter {
    pub condition: RexScalar,
}

impl Explainable for RelFilter {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Filter", conf)
            .with_value("condition", &self.condition)
            .build()
    }
}

impl RelNode for RelFilter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        func(&self.condition)
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        func(&mut self.condition)
    }
}

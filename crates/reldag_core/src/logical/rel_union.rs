use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

/// Union of two or more inputs with identical shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelUnion {
    pub is_all: bool,
}

impl Explainable for RelUnion {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Union", conf)
            .with_value("all", self.is_all)
            .build()
    }
}

impl RelNode for RelUnion {
    fn name(&self) -> &'static str {
        "Union"
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

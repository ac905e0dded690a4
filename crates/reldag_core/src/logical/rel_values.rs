use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::rex::literal::RexLiteral;
use crate::types::TargetMetaInfo;

/// Inline rows of literals.
#[derive(Debug, Clone, PartialEq)]
pub struct RelValues {
    pub tuple_type: Vec<TargetMetaInfo>,
    pub rows: Vec<Vec<RexLiteral>>,
}

impl Explainable for RelValues {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Values", conf)
            .with_value("num_rows", self.rows.len())
            .with_values_if_verbose(
                "columns",
                self.tuple_type.iter().map(|t| format!("{}: {}", t.name, t.ty)),
            )
            .build()
    }
}

impl RelNode for RelValues {
    fn name(&self) -> &'static str {
        "Values"
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

use std::fmt;
use std::sync::Arc;

use reldag_error::{Result, not_supported};

use super::node::RelNode;
use crate::catalog::TableDescriptor;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifyOperation {
    Insert,
    Update,
    Delete,
}

impl ModifyOperation {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "INSERT" => Ok(ModifyOperation::Insert),
            "UPDATE" => Ok(ModifyOperation::Update),
            "DELETE" => Ok(ModifyOperation::Delete),
            other => Err(not_supported!("Unsupported table modify operation: {other}")),
        }
    }
}

impl fmt::Display for ModifyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelModify {
    pub table: Arc<TableDescriptor>,
    pub operation: ModifyOperation,
    pub flattened: bool,
    /// Columns assigned by an UPDATE.
    pub target_columns: Vec<String>,
}

impl Explainable for RelModify {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Modify", conf)
            .with_value("operation", self.operation)
            .with_value("table", &self.table.name)
            .with_values_if_verbose("columns", &self.target_columns)
            .build()
    }
}

impl RelNode for RelModify {
    fn name(&self) -> &'static str {
        "Modify"
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

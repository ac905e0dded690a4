use std::sync::Arc;

use reldag_error::Result;

use super::node::RelNode;
use crate::catalog::{MaterializedTableDescriptor, TableDescriptor};
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

/// Scan of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelScan {
    pub table: Arc<TableDescriptor>,
    /// Output column names. The scan produces one column per name.
    pub field_names: Vec<String>,
}

impl Explainable for RelScan {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Scan", conf)
            .with_value("table", &self.table.name)
            .with_values_if_verbose("fields", &self.field_names)
            .build()
    }
}

impl RelNode for RelScan {
    fn name(&self) -> &'static str {
        "Scan"
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

/// Scan of a materialized table registered by id.
///
/// Columns are unnamed, a column's name is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelMatScan {
    pub table: Arc<MaterializedTableDescriptor>,
}

impl RelMatScan {
    pub fn field_name(&self, idx: usize) -> String {
        idx.to_string()
    }
}

impl Explainable for RelMatScan {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("MaterializedScan", conf)
            .with_value("table_id", self.table.id)
            .with_value_if_verbose("num_columns", self.table.columns.len())
            .build()
    }
}

impl RelNode for RelMatScan {
    fn name(&self) -> &'static str {
        "MaterializedScan"
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

use std::sync::Arc;

use reldag_error::Result;

use super::node::RelNode;
use crate::catalog::TableDescriptor;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::rex::window::is_window_function_operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifyKind {
    Update,
    Delete,
}

/// Marks a node as producing the rows targeted by an UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyManipulation {
    pub kind: ModifyKind,
    pub table: Arc<TableDescriptor>,
    /// Columns being updated. Empty for deletes.
    pub target_columns: Vec<String>,
    /// If any updated column is variable length.
    pub varlen_update_required: bool,
}

/// Projection. `exprs` and `fields` are parallel.
#[derive(Debug, Clone, PartialEq)]
pub struct RelProject {
    pub exprs: Vec<RexScalar>,
    pub fields: Vec<String>,
    pub manipulation: Option<ModifyManipulation>,
}

impl RelProject {
    pub fn new(exprs: Vec<RexScalar>, fields: Vec<String>) -> Self {
        RelProject {
            exprs,
            fields,
            manipulation: None,
        }
    }

    /// If every expression is a plain column reference.
    pub fn is_simple(&self) -> bool {
        self.exprs.iter().all(|e| matches!(e, RexScalar::Input(_)))
    }

    pub fn has_window_function_expr(&self) -> bool {
        self.exprs.iter().any(is_window_function_operator)
    }

    pub fn is_manipulation_target(&self) -> bool {
        self.manipulation.is_some()
    }
}

impl Explainable for RelProject {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = EntryBuilder::new("Project", conf)
            .with_values("exprs", &self.exprs)
            .with_values_if_verbose("fields", &self.fields);
        if let Some(manipulation) = &self.manipulation {
            ent = ent.with_value("modifies", &manipulation.table.name);
        }
        ent.build()
    }
}

impl RelNode for RelProject {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        self.exprs.iter().try_for_each(func)
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        self.exprs.iter_mut().try_for_each(func)
    }
}

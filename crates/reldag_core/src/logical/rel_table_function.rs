use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{ColumnIndexes, EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

/// Table valued function call.
///
/// Outputs are `RexScalar::Ref` placeholders, one per output field.
#[derive(Debug, Clone, PartialEq)]
pub struct RelTableFunction {
    pub function_name: String,
    pub fields: Vec<String>,
    /// Columns of the input forwarded through a cursor argument.
    pub col_inputs: Vec<usize>,
    /// Function arguments.
    pub inputs: Vec<RexScalar>,
    pub target_exprs: Vec<RexScalar>,
}

impl Explainable for RelTableFunction {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("TableFunction", conf)
            .with_value("function", &self.function_name)
            .with_values("inputs", &self.inputs)
            .with_value_if_verbose("cursor_columns", ColumnIndexes(&self.col_inputs))
            .with_values_if_verbose("fields", &self.fields)
            .build()
    }
}

impl RelNode for RelTableFunction {
    fn name(&self) -> &'static str {
        "TableFunction"
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        self.inputs.iter().try_for_each(&mut func)?;
        self.target_exprs.iter().try_for_each(&mut func)
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        self.inputs.iter_mut().try_for_each(&mut func)?;
        self.target_exprs.iter_mut().try_for_each(&mut func)
    }
}

use reldag_error::Result;

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::rex::window::SortField;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelSort {
    pub collation: Vec<SortField>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Set when the planner asked for zero rows.
    pub empty_result: bool,
}

impl RelSort {
    /// If this sort only orders rows without limiting them.
    pub fn is_plain(&self) -> bool {
        self.limit.is_none() && self.offset == 0 && !self.empty_result
    }
}

impl Explainable for RelSort {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = EntryBuilder::new("Sort", conf).with_values("collation", &self.collation);
        if let Some(limit) = self.limit {
            ent = ent.with_value("limit", limit);
        }
        if self.offset != 0 {
            ent = ent.with_value("offset", self.offset);
        }
        if self.empty_result {
            ent = ent.with_value("empty_result", true);
        }
        ent.build()
    }
}

impl RelNode for RelSort {
    fn name(&self) -> &'static str {
        "Sort"
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

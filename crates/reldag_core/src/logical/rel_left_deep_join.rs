use reldag_error::Result;

use super::node::RelNode;
use super::rel_join::JoinType;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

/// A chain of left-deep binary joins flattened into one multi-way join.
///
/// Input `0` is the leftmost relation, input `i` is the right side of the
/// `i`-th join level. Column references use the inputs directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RelLeftDeepJoin {
    /// Conjunction of every inner join condition plus the condition of the
    /// filter the chain was rooted at, if any.
    pub condition: RexScalar,
    /// Per level conditions of LEFT joins. `outer_conditions[i]` belongs to
    /// the join of input `i + 1`, `None` for inner levels.
    pub outer_conditions: Vec<Option<RexScalar>>,
    /// Join type per level, parallel with `outer_conditions`.
    pub join_types: Vec<JoinType>,
    /// Ids of the replaced filter (if any) and joins, outermost first.
    pub original_ids: Vec<u32>,
}

impl RelLeftDeepJoin {
    pub fn level_count(&self) -> usize {
        self.join_types.len()
    }
}

impl Explainable for RelLeftDeepJoin {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = EntryBuilder::new("LeftDeepJoin", conf)
            .with_value("condition", &self.condition)
            .with_values("join_types", &self.join_types);
        let outer: Vec<_> = self
            .outer_conditions
            .iter()
            .enumerate()
            .filter_map(|(idx, cond)| cond.as_ref().map(|c| format!("{}: {c}", idx + 1)))
            .collect();
        if !outer.is_empty() {
            ent = ent.with_values("outer_conditions", outer);
        }
        ent.with_values_if_verbose("original_ids", &self.original_ids)
            .build()
    }
}

impl RelNode for RelLeftDeepJoin {
    fn name(&self) -> &'static str {
        "LeftDeepJoin"
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        func(&self.condition)?;
        self.outer_conditions.iter().flatten().try_for_each(func)
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        func(&mut self.condition)?;
        self.outer_conditions.iter_mut().flatten().try_for_each(func)
    }
}

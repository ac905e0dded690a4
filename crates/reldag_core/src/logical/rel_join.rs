use std::fmt;

use reldag_error::{Result, not_supported};

use super::node::RelNode;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Standard INNER join.
    Inner,
    /// Standard LEFT join.
    Left,
}

impl JoinType {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "inner" | "INNER" => Ok(JoinType::Inner),
            "left" | "LEFT" => Ok(JoinType::Left),
            other => Err(not_supported!("Unsupported join type: {other}")),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
        }
    }
}

/// Binary join. Output is the left input's columns followed by the right
/// input's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RelJoin {
    pub condition: RexScalar,
    pub join_type: JoinType,
}

impl Explainable for RelJoin {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new("Join", conf)
            .with_value("join_type", self.join_type)
            .with_value("condition", &self.condition)
            .build()
    }
}

impl RelNode for RelJoin {
    fn name(&self) -> &'static str {
        "Join"
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

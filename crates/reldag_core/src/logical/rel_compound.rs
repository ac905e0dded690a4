use std::fmt;

use reldag_error::Result;

use super::node::RelNode;
use super::rel_project::ModifyManipulation;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::rex::agg::RexAgg;

/// An output column of a compound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundTarget {
    /// Index into `scalar_sources`.
    Source(usize),
    /// Index into `aggs`.
    Agg(usize),
}

impl fmt::Display for CompoundTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(idx) => write!(f, "src#{idx}"),
            Self::Agg(idx) => write!(f, "agg#{idx}"),
        }
    }
}

/// A filter, projection and optional aggregate fused into a single node.
///
/// Scalar sources are evaluated against the node's input after the filter
/// is applied. Aggregate operands index into the scalar sources. When
/// aggregating, group key sources are `RexScalar::Ref` values holding the
/// 1-based group key position.
#[derive(Debug, Clone, PartialEq)]
pub struct RelCompound {
    pub filter: Option<RexScalar>,
    pub scalar_sources: Vec<RexScalar>,
    pub group_count: usize,
    pub aggs: Vec<RexAgg>,
    /// One entry per output column, parallel with `fields`.
    pub targets: Vec<CompoundTarget>,
    pub fields: Vec<String>,
    pub is_agg: bool,
    pub manipulation: Option<ModifyManipulation>,
}

impl RelCompound {
    pub fn output_size(&self) -> usize {
        self.targets.len()
    }

    /// Expression producing an output column, if it's not an aggregate.
    pub fn target_source(&self, idx: usize) -> Option<&RexScalar> {
        match self.targets.get(idx)? {
            CompoundTarget::Source(src) => self.scalar_sources.get(*src),
            CompoundTarget::Agg(_) => None,
        }
    }
}

impl Explainable for RelCompound {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = EntryBuilder::new("Compound", conf);
        if let Some(filter) = &self.filter {
            ent = ent.with_value("filter", filter);
        }
        ent = ent.with_values("sources", &self.scalar_sources);
        if self.is_agg {
            ent = ent
                .with_value("group_count", self.group_count)
                .with_values("aggregates", &self.aggs);
        }
        ent = ent
            .with_values_if_verbose("targets", &self.targets)
            .with_values_if_verbose("fields", &self.fields);
        if let Some(manipulation) = &self.manipulation {
            ent = ent.with_value("modifies", &manipulation.table.name);
        }
        ent.build()
    }
}

impl RelNode for RelCompound {
    fn name(&self) -> &'static str {
        "Compound"
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        if let Some(filter) = &self.filter {
            func(filter)?;
        }
        self.scalar_sources.iter().try_for_each(func)
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        if let Some(filter) = &mut self.filter {
            func(filter)?;
        }
        self.scalar_sources.iter_mut().try_for_each(func)
    }
}

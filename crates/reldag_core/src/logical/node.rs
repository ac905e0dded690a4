use std::any::Any;
use std::fmt;
use std::sync::Arc;

use reldag_error::{Result, internal};

use super::dag::NodeId;
use super::rel_aggregate::RelAggregate;
use super::rel_compound::RelCompound;
use super::rel_filter::RelFilter;
use super::rel_join::RelJoin;
use super::rel_left_deep_join::RelLeftDeepJoin;
use super::rel_modify::RelModify;
use super::rel_project::RelProject;
use super::rel_scan::{RelMatScan, RelScan};
use super::rel_sort::RelSort;
use super::rel_table_function::RelTableFunction;
use super::rel_union::RelUnion;
use super::rel_values::RelValues;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::rex::RexScalar;
use crate::types::TargetMetaInfo;

/// Common operations across all relational operators.
///
/// Mirrors what every operator needs to expose for binding and rewriting: a
/// name and access to the scalar expressions it owns.
pub trait RelNode {
    /// Name of the operator.
    fn name(&self) -> &'static str;

    fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>;

    fn for_each_expr_mut<'a, F>(&'a mut self, func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>;
}

/// Opaque state attached to a node while a query executes.
#[derive(Clone)]
pub struct ContextData(pub Arc<dyn Any + Send + Sync>);

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextData").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelAlgOperator {
    Scan(RelScan),
    MatScan(RelMatScan),
    Project(RelProject),
    Filter(RelFilter),
    Aggregate(RelAggregate),
    Join(RelJoin),
    Sort(RelSort),
    Values(RelValues),
    Modify(RelModify),
    TableFunction(RelTableFunction),
    Union(RelUnion),
    Compound(RelCompound),
    LeftDeepJoin(RelLeftDeepJoin),
}

/// Number of inputs an operator must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    Exact(usize),
    AtLeast(usize),
}

impl RelAlgOperator {
    pub const fn input_arity(&self) -> InputArity {
        match self {
            Self::Scan(_) | Self::MatScan(_) | Self::Values(_) => InputArity::Exact(0),
            Self::Project(_)
            | Self::Filter(_)
            | Self::Aggregate(_)
            | Self::Sort(_)
            | Self::Modify(_)
            | Self::TableFunction(_)
            | Self::Compound(_) => InputArity::Exact(1),
            Self::Join(_) => InputArity::Exact(2),
            Self::Union(_) | Self::LeftDeepJoin(_) => InputArity::AtLeast(2),
        }
    }

    /// Joins reference columns of their inputs by input id.
    pub const fn is_join(&self) -> bool {
        matches!(self, Self::Join(_) | Self::LeftDeepJoin(_))
    }
}

impl RelNode for RelAlgOperator {
    fn name(&self) -> &'static str {
        match self {
            Self::Scan(n) => n.name(),
            Self::MatScan(n) => n.name(),
            Self::Project(n) => n.name(),
            Self::Filter(n) => n.name(),
            Self::Aggregate(n) => n.name(),
            Self::Join(n) => n.name(),
            Self::Sort(n) => n.name(),
            Self::Values(n) => n.name(),
            Self::Modify(n) => n.name(),
            Self::TableFunction(n) => n.name(),
            Self::Union(n) => n.name(),
            Self::Compound(n) => n.name(),
            Self::LeftDeepJoin(n) => n.name(),
        }
    }

    fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        match self {
            Self::Project(n) => n.for_each_expr(func),
            Self::Filter(n) => n.for_each_expr(func),
            Self::Join(n) => n.for_each_expr(func),
            Self::TableFunction(n) => n.for_each_expr(func),
            Self::Compound(n) => n.for_each_expr(func),
            Self::LeftDeepJoin(n) => n.for_each_expr(func),
            Self::Scan(_)
            | Self::MatScan(_)
            | Self::Aggregate(_)
            | Self::Sort(_)
            | Self::Values(_)
            | Self::Modify(_)
            | Self::Union(_) => Ok(()),
        }
    }

    fn for_each_expr_mut<'a, F>(&'a mut self, func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        match self {
            Self::Project(n) => n.for_each_expr_mut(func),
            Self::Filter(n) => n.for_each_expr_mut(func),
            Self::Join(n) => n.for_each_expr_mut(func),
            Self::TableFunction(n) => n.for_each_expr_mut(func),
            Self::Compound(n) => n.for_each_expr_mut(func),
            Self::LeftDeepJoin(n) => n.for_each_expr_mut(func),
            Self::Scan(_)
            | Self::MatScan(_)
            | Self::Aggregate(_)
            | Self::Sort(_)
            | Self::Values(_)
            | Self::Modify(_)
            | Self::Union(_) => Ok(()),
        }
    }
}

impl Explainable for RelAlgOperator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        match self {
            Self::Scan(n) => n.explain_entry(conf),
            Self::MatScan(n) => n.explain_entry(conf),
            Self::Project(n) => n.explain_entry(conf),
            Self::Filter(n) => n.explain_entry(conf),
            Self::Aggregate(n) => n.explain_entry(conf),
            Self::Join(n) => n.explain_entry(conf),
            Self::Sort(n) => n.explain_entry(conf),
            Self::Values(n) => n.explain_entry(conf),
            Self::Modify(n) => n.explain_entry(conf),
            Self::TableFunction(n) => n.explain_entry(conf),
            Self::Union(n) => n.explain_entry(conf),
            Self::Compound(n) => n.explain_entry(conf),
            Self::LeftDeepJoin(n) => n.explain_entry(conf),
        }
    }
}

/// A node in the relational algebra DAG.
#[derive(Debug, Clone)]
pub struct RelAlgNode {
    /// Build scoped id.
    pub id: u32,
    /// Inputs to this node, in operator order.
    pub inputs: Vec<NodeId>,
    /// Output names and types, filled in by later stages.
    pub output_metainfo: Vec<TargetMetaInfo>,
    pub context_data: Option<ContextData>,
    pub op: RelAlgOperator,
}

impl RelAlgNode {
    pub fn new(id: u32, inputs: Vec<NodeId>, op: RelAlgOperator) -> Self {
        RelAlgNode {
            id,
            inputs,
            output_metainfo: Vec::new(),
            context_data: None,
            op,
        }
    }

    pub fn op_name(&self) -> &'static str {
        self.op.name()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input(&self, idx: usize) -> Result<NodeId> {
        self.inputs.get(idx).copied().ok_or_else(|| {
            internal!(
                "Expected at least {} inputs to {}, have {}",
                idx + 1,
                self.op.name(),
                self.inputs.len()
            )
        })
    }

    /// Get the only input of a unary node.
    pub fn single_input(&self) -> Result<NodeId> {
        if self.inputs.len() != 1 {
            return Err(internal!(
                "Expected 1 input to {}, have {}",
                self.op.name(),
                self.inputs.len()
            ));
        }
        Ok(self.inputs[0])
    }

    /// Check the number of inputs against what the operator expects.
    pub fn check_input_count(&self) -> Result<()> {
        let ok = match self.op.input_arity() {
            InputArity::Exact(n) => self.inputs.len() == n,
            InputArity::AtLeast(n) => self.inputs.len() >= n,
        };
        if !ok {
            return Err(internal!(
                "Invalid input count {} for {} (expected {:?})",
                self.inputs.len(),
                self.op.name(),
                self.op.input_arity()
            ));
        }
        Ok(())
    }

    pub fn set_output_metainfo(&mut self, metainfo: Vec<TargetMetaInfo>) {
        self.output_metainfo = metainfo;
    }

    pub fn set_context_data(&mut self, data: ContextData) {
        self.context_data = Some(data);
    }

    /// Clear any state left over from executing this node.
    pub fn reset_query_execution_state(&mut self) {
        self.context_data = None;
    }

    pub fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        self.op.for_each_expr(func)
    }

    pub fn for_each_expr_mut<'a, F>(&'a mut self, func: F) -> Result<()>
    where
        F: FnMut(&'a mut RexScalar) -> Result<()>,
    {
        self.op.for_each_expr_mut(func)
    }
}

impl Explainable for RelAlgNode {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = self.op.explain_entry(conf).with_value("id", self.id);
        if conf.verbose && !self.output_metainfo.is_empty() {
            ent = ent.with_values(
                "output",
                self.output_metainfo
                    .iter()
                    .map(|m| format!("{}: {}", m.name, m.ty)),
            );
        }
        ent
    }
}

impl fmt::Display for RelAlgNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain_entry(ExplainConfig::default()))
    }
}

//! Scalar expressions attached to relational nodes.

pub mod agg;
pub mod case_expr;
pub mod literal;
pub mod operator;
pub mod subquery;
pub mod window;

use std::fmt;

use case_expr::RexCase;
use literal::RexLiteral;
use operator::{RexFunctionOperator, RexOperator, SqlOperator};
use reldag_error::{Result, internal};
use subquery::RexSubQuery;
use window::RexWindowFunction;

use crate::logical::dag::NodeId;
use crate::types::SqlType;

/// Reference to a single output column of a node in the same DAG.
///
/// The reference doesn't keep the node alive, the DAG owns all nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RexInput {
    pub source: NodeId,
    pub index: usize,
}

impl RexInput {
    pub const fn new(source: NodeId, index: usize) -> Self {
        RexInput { source, index }
    }
}

impl fmt::Display for RexInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RexScalar {
    /// Positional reference into the concatenated outputs of the owning
    /// node's inputs. Only exists between deserialization and binding.
    AbstractInput(usize),
    /// Bound column reference.
    Input(RexInput),
    Literal(RexLiteral),
    Operator(RexOperator),
    Function(RexFunctionOperator),
    WindowFunction(Box<RexWindowFunction>),
    Case(RexCase),
    /// Reference resolved by the owning node, e.g. 1-based group key
    /// references in compound nodes or table function outputs.
    Ref(usize),
    SubQuery(RexSubQuery),
}

impl RexScalar {
    pub const fn input(source: NodeId, index: usize) -> Self {
        RexScalar::Input(RexInput { source, index })
    }

    pub fn is_literal_true(&self) -> bool {
        matches!(self, RexScalar::Literal(lit) if lit.is_true())
    }

    /// Combine expressions with AND. A single expression is returned as is.
    pub fn and_all(mut exprs: Vec<RexScalar>) -> Option<RexScalar> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(RexScalar::Operator(RexOperator::new(
                SqlOperator::And,
                exprs,
                SqlType::boolean(),
            ))),
        }
    }

    /// Call `func` for each direct child.
    ///
    /// Subqueries are opaque, their expressions reference nodes of the nested
    /// DAG.
    pub fn for_each_child<'a, F>(&'a self, func: &mut F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        match self {
            RexScalar::Operator(op) => op.operands.iter().try_for_each(func),
            RexScalar::Function(op) => op.operands.iter().try_for_each(func),
            RexScalar::WindowFunction(window) => {
                window.operands.iter().try_for_each(&mut *func)?;
                window.partition_keys.iter().try_for_each(&mut *func)?;
                window.order_keys.iter().try_for_each(&mut *func)?;
                if let Some(offset) = &window.lower_bound.offset {
                    func(offset)?;
                }
                if let Some(offset) = &window.upper_bound.offset {
                    func(offset)?;
                }
                Ok(())
            }
            RexScalar::Case(case) => {
                for (when, then) in &case.when_then {
                    func(when)?;
                    func(then)?;
                }
                if let Some(else_expr) = &case.else_expr {
                    func(else_expr)?;
                }
                Ok(())
            }
            RexScalar::AbstractInput(_)
            | RexScalar::Input(_)
            | RexScalar::Literal(_)
            | RexScalar::Ref(_)
            | RexScalar::SubQuery(_) => Ok(()),
        }
    }

    pub fn for_each_child_mut<F>(&mut self, func: &mut F) -> Result<()>
    where
        F: FnMut(&mut RexScalar) -> Result<()>,
    {
        match self {
            RexScalar::Operator(op) => op.operands.iter_mut().try_for_each(func),
            RexScalar::Function(op) => op.operands.iter_mut().try_for_each(func),
            RexScalar::WindowFunction(window) => {
                window.operands.iter_mut().try_for_each(&mut *func)?;
                window.partition_keys.iter_mut().try_for_each(&mut *func)?;
                window.order_keys.iter_mut().try_for_each(&mut *func)?;
                if let Some(offset) = &mut window.lower_bound.offset {
                    func(offset)?;
                }
                if let Some(offset) = &mut window.upper_bound.offset {
                    func(offset)?;
                }
                Ok(())
            }
            RexScalar::Case(case) => {
                for (when, then) in &mut case.when_then {
                    func(when)?;
                    func(then)?;
                }
                if let Some(else_expr) = &mut case.else_expr {
                    func(else_expr)?;
                }
                Ok(())
            }
            RexScalar::AbstractInput(_)
            | RexScalar::Input(_)
            | RexScalar::Literal(_)
            | RexScalar::Ref(_)
            | RexScalar::SubQuery(_) => Ok(()),
        }
    }

    /// Walk the expression tree pre-order.
    pub fn walk<'a, F>(&'a self, func: &mut F) -> Result<()>
    where
        F: FnMut(&'a RexScalar) -> Result<()>,
    {
        func(self)?;
        self.for_each_child(&mut |child| child.walk(func))
    }

    /// Walk the expression tree pre-order, allowing nodes to be replaced.
    ///
    /// Children of a replaced node are the children of the replacement.
    pub fn walk_mut<F>(&mut self, func: &mut F) -> Result<()>
    where
        F: FnMut(&mut RexScalar) -> Result<()>,
    {
        func(self)?;
        self.for_each_child_mut(&mut |child| child.walk_mut(func))
    }

    /// Call `func` on every bound column reference in this expression.
    pub fn for_each_input<F>(&self, mut func: F) -> Result<()>
    where
        F: FnMut(&RexInput) -> Result<()>,
    {
        self.walk(&mut |expr| match expr {
            RexScalar::Input(input) => func(input),
            _ => Ok(()),
        })
    }

    pub fn for_each_input_mut<F>(&mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&mut RexInput) -> Result<()>,
    {
        self.walk_mut(&mut |expr| match expr {
            RexScalar::Input(input) => func(input),
            _ => Ok(()),
        })
    }

    /// Collect all bound column references.
    pub fn collect_inputs(&self, out: &mut Vec<RexInput>) {
        // Infallible, the closure never errors.
        let _ = self.for_each_input(|input| {
            out.push(*input);
            Ok(())
        });
    }

    /// Resolve positional inputs against the given output shape.
    pub fn bind_inputs(&mut self, output: &[RexInput]) -> Result<()> {
        self.walk_mut(&mut |expr| {
            if let RexScalar::AbstractInput(idx) = expr {
                let bound = output.get(*idx).ok_or_else(|| {
                    internal!(
                        "Input index {idx} out of range for output with {} columns",
                        output.len()
                    )
                })?;
                *expr = RexScalar::Input(*bound);
            }
            Ok(())
        })
    }

    /// Point every reference to `old` at `new`, keeping the column index.
    pub fn rebind_inputs(&mut self, old: NodeId, new: NodeId) {
        let _ = self.for_each_input_mut(|input| {
            if input.source == old {
                input.source = new;
            }
            Ok(())
        });
    }

    pub fn has_abstract_input(&self) -> bool {
        let mut found = false;
        let _ = self.walk(&mut |expr| {
            if matches!(expr, RexScalar::AbstractInput(_)) {
                found = true;
            }
            Ok(())
        });
        found
    }
}

impl fmt::Display for RexScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbstractInput(idx) => write!(f, "${idx}"),
            Self::Input(input) => write!(f, "{input}"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Operator(op) => write!(f, "{op}"),
            Self::Function(op) => write!(f, "{op}"),
            Self::WindowFunction(window) => write!(f, "{window}"),
            Self::Case(case) => write!(f, "{case}"),
            Self::Ref(idx) => write!(f, "&{idx}"),
            Self::SubQuery(subquery) => write!(f, "{subquery}"),
        }
    }
}

/// Split a conjunction into its parts, flattening nested ANDs.
pub fn split_conjunction(expr: RexScalar, out: &mut Vec<RexScalar>) {
    match expr {
        RexScalar::Operator(RexOperator {
            op: SqlOperator::And,
            operands,
            ..
        }) => {
            for operand in operands {
                split_conjunction(operand, out);
            }
        }
        other => out.push(other),
    }
}

use std::fmt;

use super::RexScalar;
use crate::types::SqlType;

/// Built-in operators recognized by name.
///
/// Anything not listed here is carried as a [`RexFunctionOperator`] and
/// resolved further down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOperator {
    And,
    Or,
    Not,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    IsDistinctFrom,
    IsNotDistinctFrom,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    UnaryMinus,
    IsNull,
    IsNotNull,
    Cast,
    In,
    ArrayAt,
    Unnest,
}

impl SqlOperator {
    /// Try to resolve an operator name. Returns `None` for names that should
    /// be treated as function calls.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            "=" => Self::Eq,
            "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::LtEq,
            ">" => Self::Gt,
            ">=" => Self::GtEq,
            "IS DISTINCT FROM" => Self::IsDistinctFrom,
            "IS NOT DISTINCT FROM" => Self::IsNotDistinctFrom,
            "+" => Self::Plus,
            "-" => Self::Minus,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            "MOD" | "%" => Self::Modulo,
            "UMINUS" => Self::UnaryMinus,
            "IS NULL" => Self::IsNull,
            "IS NOT NULL" => Self::IsNotNull,
            "CAST" => Self::Cast,
            "IN" => Self::In,
            "ITEM" => Self::ArrayAt,
            "PG_UNNEST" => Self::Unnest,
            _ => return None,
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::IsDistinctFrom => "IS DISTINCT FROM",
            Self::IsNotDistinctFrom => "IS NOT DISTINCT FROM",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "MOD",
            Self::UnaryMinus => "UMINUS",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::Cast => "CAST",
            Self::In => "IN",
            Self::ArrayAt => "ITEM",
            Self::Unnest => "PG_UNNEST",
        }
    }
}

impl fmt::Display for SqlOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RexOperator {
    pub op: SqlOperator,
    pub operands: Vec<RexScalar>,
    pub ty: SqlType,
}

impl RexOperator {
    pub fn new(op: SqlOperator, operands: Vec<RexScalar>, ty: SqlType) -> Self {
        RexOperator { op, operands, ty }
    }
}

impl fmt::Display for RexOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.op, self.operands.as_slice()) {
            (SqlOperator::Cast, [operand]) => write!(f, "CAST({operand} AS {})", self.ty.kind),
            (SqlOperator::IsNull | SqlOperator::IsNotNull, [operand]) => {
                write!(f, "({operand} {})", self.op)
            }
            (op, [left, right]) if op != SqlOperator::In => write!(f, "({left} {op} {right})"),
            (op, operands) => {
                write!(f, "{op}(")?;
                fmt_operands(f, operands)?;
                write!(f, ")")
            }
        }
    }
}

/// Call to a function not known to the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct RexFunctionOperator {
    pub name: String,
    pub operands: Vec<RexScalar>,
    pub ty: SqlType,
}

impl fmt::Display for RexFunctionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        fmt_operands(f, &self.operands)?;
        write!(f, ")")
    }
}

pub(crate) fn fmt_operands(f: &mut fmt::Formatter<'_>, operands: &[RexScalar]) -> fmt::Result {
    for (idx, operand) in operands.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{operand}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_functions() {
        assert_eq!(Some(SqlOperator::Divide), SqlOperator::from_name("/"));
        assert_eq!(None, SqlOperator::from_name("LIKE"));
        assert_eq!(None, SqlOperator::from_name("PG_ANY"));
    }

    #[test]
    fn names_roundtrip() {
        for op in [
            SqlOperator::And,
            SqlOperator::IsNotDistinctFrom,
            SqlOperator::Modulo,
            SqlOperator::Unnest,
        ] {
            assert_eq!(Some(op), SqlOperator::from_name(op.as_str()));
        }
    }
}

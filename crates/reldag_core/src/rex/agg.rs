use std::fmt;

use reldag_error::{Result, not_supported};

use crate::types::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    Avg,
    Min,
    Max,
    Sum,
    Count,
    ApproxCountDistinct,
    ApproxQuantile,
    Sample,
    SingleValue,
}

impl AggKind {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "AVG" => Self::Avg,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "SUM" | "$SUM0" => Self::Sum,
            "COUNT" => Self::Count,
            "APPROX_COUNT_DISTINCT" => Self::ApproxCountDistinct,
            "APPROX_PERCENTILE" | "APPROX_QUANTILE" => Self::ApproxQuantile,
            "SAMPLE" | "LAST_SAMPLE" => Self::Sample,
            "SINGLE_VALUE" => Self::SingleValue,
            other => return Err(not_supported!("Unsupported aggregate function: {other}")),
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::ApproxCountDistinct => "APPROX_COUNT_DISTINCT",
            Self::ApproxQuantile => "APPROX_QUANTILE",
            Self::Sample => "SAMPLE",
            Self::SingleValue => "SINGLE_VALUE",
        }
    }

    /// Aggregates allowed to take a second (constant) argument.
    pub const fn accepts_two_operands(&self) -> bool {
        matches!(self, Self::ApproxCountDistinct | Self::ApproxQuantile)
    }
}

/// Aggregate call. Operands are column positions in the aggregate's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RexAgg {
    pub kind: AggKind,
    pub distinct: bool,
    pub ty: SqlType,
    pub operands: Vec<usize>,
}

impl fmt::Display for RexAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.as_str())?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        for (idx, operand) in self.operands.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "#{operand}")?;
        }
        write!(f, ")")
    }
}

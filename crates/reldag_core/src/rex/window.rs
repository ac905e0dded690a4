use std::fmt;

use reldag_error::{Result, not_supported};
use serde::{Deserialize, Serialize};

use super::operator::{SqlOperator, fmt_operands};
use super::RexScalar;
use crate::types::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunctionKind {
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    Avg,
    Min,
    Max,
    Sum,
    Count,
    /// `$SUM0`, sum that yields zero instead of null on empty frames. Used
    /// when the planner rewrites windowed SUM/AVG with explicit null handling.
    SumInternal,
}

impl WindowFunctionKind {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "ROW_NUMBER" => Self::RowNumber,
            "RANK" => Self::Rank,
            "DENSE_RANK" => Self::DenseRank,
            "PERCENT_RANK" => Self::PercentRank,
            "CUME_DIST" => Self::CumeDist,
            "NTILE" => Self::Ntile,
            "LAG" => Self::Lag,
            "LEAD" => Self::Lead,
            "FIRST_VALUE" => Self::FirstValue,
            "LAST_VALUE" => Self::LastValue,
            "AVG" => Self::Avg,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "SUM" => Self::Sum,
            "COUNT" => Self::Count,
            "$SUM0" => Self::SumInternal,
            other => return Err(not_supported!("Unsupported window function: {other}")),
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RowNumber => "ROW_NUMBER",
            Self::Rank => "RANK",
            Self::DenseRank => "DENSE_RANK",
            Self::PercentRank => "PERCENT_RANK",
            Self::CumeDist => "CUME_DIST",
            Self::Ntile => "NTILE",
            Self::Lag => "LAG",
            Self::Lead => "LEAD",
            Self::FirstValue => "FIRST_VALUE",
            Self::LastValue => "LAST_VALUE",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::SumInternal => "$SUM0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_name(name: &str) -> Self {
        if name == "DESCENDING" {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsPosition {
    First,
    Last,
}

impl NullsPosition {
    pub fn from_name(name: &str) -> Self {
        if name == "FIRST" {
            NullsPosition::First
        } else {
            NullsPosition::Last
        }
    }
}

/// A single sort key, referencing a column of the sorted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortField {
    pub field: usize,
    pub direction: SortDirection,
    pub nulls: NullsPosition,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let nulls = match self.nulls {
            NullsPosition::First => "NULLS FIRST",
            NullsPosition::Last => "NULLS LAST",
        };
        write!(f, "#{} {dir} {nulls}", self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowBound {
    pub unbounded: bool,
    pub preceding: bool,
    pub following: bool,
    pub is_current_row: bool,
    pub offset: Option<Box<RexScalar>>,
    pub order_key: i64,
}

impl fmt::Display for WindowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_current_row {
            return write!(f, "CURRENT ROW");
        }
        if self.unbounded {
            write!(f, "UNBOUNDED")?;
        } else if let Some(offset) = &self.offset {
            write!(f, "{offset}")?;
        }
        if self.preceding {
            write!(f, " PRECEDING")?;
        }
        if self.following {
            write!(f, " FOLLOWING")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RexWindowFunction {
    pub kind: WindowFunctionKind,
    pub operands: Vec<RexScalar>,
    pub partition_keys: Vec<RexScalar>,
    pub order_keys: Vec<RexScalar>,
    /// Direction and null ordering for each order key. The `field` of each
    /// entry is the position of the order key.
    pub collation: Vec<SortField>,
    pub lower_bound: WindowBound,
    pub upper_bound: WindowBound,
    pub is_rows: bool,
    pub ty: SqlType,
}

impl fmt::Display for RexWindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.as_str())?;
        fmt_operands(f, &self.operands)?;
        write!(f, ") OVER (")?;
        if !self.partition_keys.is_empty() {
            write!(f, "PARTITION BY ")?;
            fmt_operands(f, &self.partition_keys)?;
        }
        if !self.order_keys.is_empty() {
            if !self.partition_keys.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "ORDER BY ")?;
            fmt_operands(f, &self.order_keys)?;
        }
        let frame = if self.is_rows { "ROWS" } else { "RANGE" };
        write!(
            f,
            " {frame} BETWEEN {} AND {})",
            self.lower_bound, self.upper_bound
        )
    }
}

/// Detect the windowed SUM encoding: `CASE WHEN COUNT(x) > 0 THEN $SUM0(x) ELSE ...`.
pub fn is_window_function_sum(rex: &RexScalar) -> bool {
    match rex {
        RexScalar::Case(case) if case.when_then.len() == 1 => matches!(
            &case.when_then[0].1,
            RexScalar::WindowFunction(window)
                if window.kind == WindowFunctionKind::SumInternal
        ),
        _ => false,
    }
}

/// Detect window function expressions, including the ones the planner builds
/// out of several nodes for null handling (windowed SUM and AVG) and ones
/// wrapped in a cast.
pub fn is_window_function_operator(rex: &RexScalar) -> bool {
    match rex {
        RexScalar::WindowFunction(_) => true,
        RexScalar::Operator(op) if op.op == SqlOperator::Cast && op.operands.len() == 1 => {
            is_window_function_operator(&op.operands[0])
        }
        RexScalar::Operator(op) if op.op == SqlOperator::Divide && op.operands.len() == 2 => {
            // AVG: (CASE WHEN COUNT > 0 THEN SUM ELSE 0) / COUNT
            let count_divisor = matches!(
                &op.operands[1],
                RexScalar::WindowFunction(window) if window.kind == WindowFunctionKind::Count
            );
            count_divisor && is_window_function_sum(&op.operands[0])
        }
        other => is_window_function_sum(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::case_expr::RexCase;
    use crate::rex::operator::RexOperator;
    use crate::rex::literal::RexLiteral;
    use crate::types::SqlTypeKind;

    fn window(kind: WindowFunctionKind) -> RexScalar {
        RexScalar::WindowFunction(Box::new(RexWindowFunction {
            kind,
            operands: vec![RexScalar::AbstractInput(0)],
            partition_keys: Vec::new(),
            order_keys: Vec::new(),
            collation: Vec::new(),
            lower_bound: WindowBound::default(),
            upper_bound: WindowBound::default(),
            is_rows: false,
            ty: SqlType::new(SqlTypeKind::BigInt, true),
        }))
    }

    fn sum_case() -> RexScalar {
        RexScalar::Case(RexCase {
            when_then: vec![(
                RexScalar::Literal(RexLiteral::boolean(true)),
                window(WindowFunctionKind::SumInternal),
            )],
            else_expr: Some(Box::new(RexScalar::Literal(RexLiteral::decimal(0)))),
        })
    }

    #[test]
    fn detects_plain_and_cast() {
        assert!(is_window_function_operator(&window(WindowFunctionKind::Rank)));

        let cast = RexScalar::Operator(RexOperator::new(
            SqlOperator::Cast,
            vec![window(WindowFunctionKind::Rank)],
            SqlType::new(SqlTypeKind::Double, true),
        ));
        assert!(is_window_function_operator(&cast));
    }

    #[test]
    fn detects_sum_and_avg_encodings() {
        assert!(is_window_function_operator(&sum_case()));

        let avg = RexScalar::Operator(RexOperator::new(
            SqlOperator::Divide,
            vec![sum_case(), window(WindowFunctionKind::Count)],
            SqlType::new(SqlTypeKind::Double, true),
        ));
        assert!(is_window_function_operator(&avg));

        let not_avg = RexScalar::Operator(RexOperator::new(
            SqlOperator::Divide,
            vec![sum_case(), RexScalar::AbstractInput(1)],
            SqlType::new(SqlTypeKind::Double, true),
        ));
        assert!(!is_window_function_operator(&not_avg));
    }

    #[test]
    fn plain_sum_case_is_not_an_encoding() {
        let case = RexScalar::Case(RexCase {
            when_then: vec![(
                RexScalar::Literal(RexLiteral::boolean(true)),
                window(WindowFunctionKind::Sum),
            )],
            else_expr: Some(Box::new(RexScalar::Literal(RexLiteral::decimal(0)))),
        });
        assert!(!is_window_function_sum(&case));
        assert!(!is_window_function_operator(&case));
    }

    #[test]
    fn unknown_kind_not_supported() {
        let err = WindowFunctionKind::from_name("NTH_VALUE").unwrap_err();
        assert!(err.is_not_supported());
    }
}

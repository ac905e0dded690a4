use std::fmt;

use crate::types::{SqlType, SqlTypeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    /// Integer payload. Decimals, dates, times and intervals are all carried
    /// as scaled integers.
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RexLiteral {
    pub value: LiteralValue,
    /// Type of the literal as written.
    pub ty: SqlTypeKind,
    /// Type the literal should be coerced to.
    pub target_type: SqlTypeKind,
    pub scale: i32,
    pub precision: i32,
    pub type_scale: i32,
    pub type_precision: i32,
}

impl RexLiteral {
    /// A typed null.
    pub fn null(target_type: SqlTypeKind) -> Self {
        RexLiteral {
            value: LiteralValue::Null,
            ty: SqlTypeKind::Null,
            target_type,
            scale: 0,
            precision: 0,
            type_scale: 0,
            type_precision: 0,
        }
    }

    pub fn boolean(v: bool) -> Self {
        RexLiteral {
            value: LiteralValue::Boolean(v),
            ty: SqlTypeKind::Boolean,
            target_type: SqlTypeKind::Boolean,
            scale: 0,
            precision: 1,
            type_scale: 0,
            type_precision: 1,
        }
    }

    /// An integer encoded the way the planner encodes exact numerics.
    pub fn decimal(v: i64) -> Self {
        RexLiteral {
            value: LiteralValue::Int64(v),
            ty: SqlTypeKind::Decimal,
            target_type: SqlTypeKind::Int,
            scale: 0,
            precision: 19,
            type_scale: 0,
            type_precision: 10,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, LiteralValue::Null)
    }

    /// If this literal is the boolean `true`.
    pub fn is_true(&self) -> bool {
        matches!(self.value, LiteralValue::Boolean(true))
    }

    /// Get the integer payload if this is an unscaled exact numeric.
    pub fn try_as_i64(&self) -> Option<i64> {
        match self.value {
            LiteralValue::Int64(v) if self.scale == 0 => Some(v),
            _ => None,
        }
    }

    /// Type of the value after coercion.
    pub fn sql_type(&self) -> SqlType {
        let mut ty = SqlType::new(self.target_type, self.is_null());
        ty.precision = self.type_precision;
        ty.scale = self.type_scale;
        ty
    }
}

impl fmt::Display for RexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            LiteralValue::Int64(v) if self.scale > 0 => {
                let div = 10_i64.pow(self.scale as u32);
                let frac = (v % div).unsigned_abs();
                let sign = if *v < 0 && v / div == 0 { "-" } else { "" };
                write!(
                    f,
                    "{sign}{}.{frac:0width$}",
                    v / div,
                    width = self.scale as usize
                )
            }
            v => write!(f, "{v}"),
        }
    }
}

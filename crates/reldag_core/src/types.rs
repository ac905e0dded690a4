use std::fmt;

use reldag_error::{Result, internal, not_supported};
use serde::{Deserialize, Serialize};

/// SQL types as they appear in serialized plans.
///
/// The discriminants match the integer codes used by materialized table
/// descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlTypeKind {
    Null = 0,
    Boolean = 1,
    Char = 2,
    Varchar = 3,
    Numeric = 4,
    Decimal = 5,
    Int = 6,
    SmallInt = 7,
    Float = 8,
    Double = 9,
    Time = 10,
    Timestamp = 11,
    BigInt = 12,
    Text = 13,
    Date = 14,
    Array = 15,
    IntervalDayTime = 16,
    IntervalYearMonth = 17,
    Point = 18,
    LineString = 19,
    Polygon = 20,
    MultiPolygon = 21,
    TinyInt = 22,
    Geometry = 23,
    Geography = 24,
    EvalContext = 25,
    Void = 26,
    Cursor = 27,
}

impl SqlTypeKind {
    /// Parse a type name from a serialized plan.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "NULL" => Self::Null,
            "BOOLEAN" => Self::Boolean,
            "CHAR" => Self::Char,
            "VARCHAR" => Self::Varchar,
            "NUMERIC" => Self::Numeric,
            "DECIMAL" => Self::Decimal,
            "INTEGER" => Self::Int,
            "SMALLINT" => Self::SmallInt,
            "FLOAT" | "REAL" => Self::Float,
            "DOUBLE" => Self::Double,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "BIGINT" => Self::BigInt,
            "TEXT" => Self::Text,
            "DATE" => Self::Date,
            "ARRAY" => Self::Array,
            "INTERVAL_DAY" | "INTERVAL_HOUR" | "INTERVAL_DAY_HOUR" | "INTERVAL_MINUTE"
            | "INTERVAL_DAY_MINUTE" | "INTERVAL_HOUR_MINUTE" | "INTERVAL_SECOND"
            | "INTERVAL_DAY_SECOND" | "INTERVAL_HOUR_SECOND" | "INTERVAL_MINUTE_SECOND" => {
                Self::IntervalDayTime
            }
            "INTERVAL_MONTH" | "INTERVAL_YEAR" | "INTERVAL_YEAR_MONTH" => {
                Self::IntervalYearMonth
            }
            "POINT" => Self::Point,
            "LINESTRING" => Self::LineString,
            "POLYGON" => Self::Polygon,
            "MULTIPOLYGON" => Self::MultiPolygon,
            "TINYINT" => Self::TinyInt,
            "GEOMETRY" => Self::Geometry,
            "GEOGRAPHY" => Self::Geography,
            "ANY" | "SYMBOL" => Self::EvalContext,
            "VOID" => Self::Void,
            "CURSOR" => Self::Cursor,
            other => return Err(not_supported!("Unsupported type: {other}")),
        })
    }

    /// Map an integer type code to a kind.
    pub fn from_code(code: i64) -> Result<Self> {
        const KINDS: [SqlTypeKind; 28] = [
            SqlTypeKind::Null,
            SqlTypeKind::Boolean,
            SqlTypeKind::Char,
            SqlTypeKind::Varchar,
            SqlTypeKind::Numeric,
            SqlTypeKind::Decimal,
            SqlTypeKind::Int,
            SqlTypeKind::SmallInt,
            SqlTypeKind::Float,
            SqlTypeKind::Double,
            SqlTypeKind::Time,
            SqlTypeKind::Timestamp,
            SqlTypeKind::BigInt,
            SqlTypeKind::Text,
            SqlTypeKind::Date,
            SqlTypeKind::Array,
            SqlTypeKind::IntervalDayTime,
            SqlTypeKind::IntervalYearMonth,
            SqlTypeKind::Point,
            SqlTypeKind::LineString,
            SqlTypeKind::Polygon,
            SqlTypeKind::MultiPolygon,
            SqlTypeKind::TinyInt,
            SqlTypeKind::Geometry,
            SqlTypeKind::Geography,
            SqlTypeKind::EvalContext,
            SqlTypeKind::Void,
            SqlTypeKind::Cursor,
        ];

        usize::try_from(code)
            .ok()
            .and_then(|idx| KINDS.get(idx).copied())
            .ok_or_else(|| internal!("Invalid type code: {code}"))
    }

    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Int | Self::BigInt
        )
    }
}

impl fmt::Display for SqlTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "NULL",
            Self::Boolean => "BOOLEAN",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Numeric => "NUMERIC",
            Self::Decimal => "DECIMAL",
            Self::Int => "INTEGER",
            Self::SmallInt => "SMALLINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::BigInt => "BIGINT",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Array => "ARRAY",
            Self::IntervalDayTime => "INTERVAL_DAY_TIME",
            Self::IntervalYearMonth => "INTERVAL_YEAR_MONTH",
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
            Self::MultiPolygon => "MULTIPOLYGON",
            Self::TinyInt => "TINYINT",
            Self::Geometry => "GEOMETRY",
            Self::Geography => "GEOGRAPHY",
            Self::EvalContext => "ANY",
            Self::Void => "VOID",
            Self::Cursor => "CURSOR",
        };
        write!(f, "{s}")
    }
}

/// A fully specified SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqlType {
    pub kind: SqlTypeKind,
    pub nullable: bool,
    #[serde(default)]
    pub precision: i32,
    #[serde(default)]
    pub scale: i32,
}

impl SqlType {
    pub const fn new(kind: SqlTypeKind, nullable: bool) -> Self {
        SqlType {
            kind,
            nullable,
            precision: 0,
            scale: 0,
        }
    }

    pub const fn boolean() -> Self {
        Self::new(SqlTypeKind::Boolean, true)
    }

    pub const fn null() -> Self {
        Self::new(SqlTypeKind::Null, true)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SqlTypeKind::Decimal | SqlTypeKind::Numeric => {
                write!(f, "{}({},{})", self.kind, self.precision, self.scale)?
            }
            kind => write!(f, "{kind}")?,
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

/// Name and type of a single output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMetaInfo {
    pub name: String,
    pub ty: SqlType,
}

impl TargetMetaInfo {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        TargetMetaInfo {
            name: name.into(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_match_discriminants() {
        for code in 0..28 {
            let kind = SqlTypeKind::from_code(code).unwrap();
            assert_eq!(code, kind as i64);
        }
        assert!(SqlTypeKind::from_code(28).unwrap_err().is_internal());
        assert!(SqlTypeKind::from_code(-1).unwrap_err().is_internal());
    }

    #[test]
    fn unknown_type_name_not_supported() {
        let err = SqlTypeKind::from_name("HYPERLOGLOG").unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn display_decimal() {
        let mut ty = SqlType::new(SqlTypeKind::Decimal, false);
        ty.precision = 10;
        ty.scale = 2;
        assert_eq!("DECIMAL(10,2) NOT NULL", ty.to_string());
    }
}

//! Deserialization of serialized relational algebra plans.
//!
//! Plans arrive as a json document with a `rels` array. Malformed structure
//! (missing fields, wrong json types) is a contract violation by the planner
//! and reported as an internal error. Constructs we don't handle are reported
//! as not supported.

pub mod dispatcher;
pub mod parse_rex;

use std::sync::Arc;

use reldag_error::{OptionExt, Result, internal};
use serde_json::Value;

use crate::builder::BuildContext;
use crate::logical::dag::RelAlgDag;
use crate::rex::literal::{LiteralValue, RexLiteral};
use crate::types::{SqlType, SqlTypeKind, TargetMetaInfo};

/// Builds nested plans for scalar subqueries found while parsing expressions.
pub trait SubqueryBuilder {
    /// Build and optimize the plan in `ast`, registering it with the context.
    fn build_subquery(&self, ctx: &mut BuildContext, ast: &Value) -> Result<Arc<RelAlgDag>>;
}

pub(crate) fn field<'a>(obj: &'a Value, name: &str) -> Result<&'a Value> {
    match obj {
        Value::Object(map) => map
            .get(name)
            .ok_or_else(|| internal!("Missing field '{name}' in {}", truncated(obj))),
        _ => Err(internal!("Expected json object, got {}", truncated(obj))),
    }
}

pub(crate) fn has_field(obj: &Value, name: &str) -> bool {
    obj.get(name).is_some()
}

pub(crate) fn json_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| internal!("Expected json string, got {}", truncated(value)))
}

pub(crate) fn json_i64(value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| internal!("Expected json integer, got {}", truncated(value)))
}

pub(crate) fn json_usize(value: &Value) -> Result<usize> {
    let v = json_i64(value)?;
    usize::try_from(v).map_err(|_| internal!("Expected non-negative integer, got {v}"))
}

pub(crate) fn json_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| internal!("Expected json bool, got {}", truncated(value)))
}

pub(crate) fn json_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| internal!("Expected json array, got {}", truncated(value)))
}

pub(crate) fn strings_from_json_array(value: &Value) -> Result<Vec<String>> {
    json_array(value)?
        .iter()
        .map(|v| json_str(v).map(|s| s.to_string()))
        .collect()
}

pub(crate) fn indices_from_json_array(value: &Value) -> Result<Vec<usize>> {
    json_array(value)?.iter().map(json_usize).collect()
}

/// Serialized form of a json value for error messages, capped in length.
pub(crate) fn truncated(value: &Value) -> String {
    const MAX_LEN: usize = 120;
    let mut s = value.to_string();
    if s.len() > MAX_LEN {
        let mut end = MAX_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("...");
    }
    s
}

fn optional_i32(obj: &Value, name: &str) -> Result<i32> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => {
            let v = json_i64(v)?;
            i32::try_from(v).map_err(|_| internal!("Value for '{name}' out of range: {v}"))
        }
    }
}

/// Parse a `{type, nullable, precision?, scale?}` object.
pub fn parse_type(obj: &Value) -> Result<SqlType> {
    let kind = SqlTypeKind::from_name(json_str(field(obj, "type")?)?)?;
    let nullable = json_bool(field(obj, "nullable")?)?;
    let mut ty = SqlType::new(kind, nullable);
    ty.precision = optional_i32(obj, "precision")?;
    ty.scale = optional_i32(obj, "scale")?;
    Ok(ty)
}

/// Parse a named type, used for value tuple types.
pub fn parse_target_metainfo(obj: &Value) -> Result<TargetMetaInfo> {
    let ty = parse_type(obj)?;
    let name = json_str(field(obj, "name")?)?;
    Ok(TargetMetaInfo::new(name, ty))
}

pub fn parse_literal(expr: &Value) -> Result<RexLiteral> {
    let literal = field(expr, "literal")?;
    let ty = SqlTypeKind::from_name(json_str(field(expr, "type")?)?)?;
    let target_type = SqlTypeKind::from_name(json_str(field(expr, "target_type")?)?)?;

    if literal.is_null() || ty == SqlTypeKind::Null {
        return Ok(RexLiteral::null(target_type));
    }

    let value = match ty {
        SqlTypeKind::Decimal
        | SqlTypeKind::Numeric
        | SqlTypeKind::IntervalDayTime
        | SqlTypeKind::IntervalYearMonth
        | SqlTypeKind::Time
        | SqlTypeKind::Timestamp
        | SqlTypeKind::Date => LiteralValue::Int64(json_i64(literal)?),
        kind if kind.is_integer() => LiteralValue::Int64(json_i64(literal)?),
        SqlTypeKind::Double | SqlTypeKind::Float => match literal.as_f64() {
            // Integral json numbers are accepted for doubles.
            Some(v) => LiteralValue::Float64(v),
            None => {
                return Err(internal!(
                    "Expected json number for {ty} literal, got {}",
                    truncated(literal)
                ));
            }
        },
        SqlTypeKind::Char | SqlTypeKind::Varchar | SqlTypeKind::Text => {
            LiteralValue::Utf8(json_str(literal)?.to_string())
        }
        SqlTypeKind::Boolean => LiteralValue::Boolean(json_bool(literal)?),
        other => return Err(internal!("Unexpected literal type: {other}")),
    };

    Ok(RexLiteral {
        value,
        ty,
        target_type,
        scale: optional_i32(expr, "scale")?,
        precision: optional_i32(expr, "precision")?,
        type_scale: optional_i32(expr, "type_scale")?,
        type_precision: optional_i32(expr, "type_precision")?,
    })
}

/// Read an optional unscaled integer literal field, e.g. a sort's `fetch`.
pub(crate) fn int_literal_field(obj: &Value, name: &str) -> Result<Option<i64>> {
    let Some(value) = obj.get(name) else {
        return Ok(None);
    };
    let lit = parse_literal(value)?;
    if lit.ty != SqlTypeKind::Decimal || lit.type_scale != 0 {
        return Err(internal!("Expected unscaled integer literal for '{name}'"));
    }
    lit.try_as_i64().map(Some).required("integer literal value")
}

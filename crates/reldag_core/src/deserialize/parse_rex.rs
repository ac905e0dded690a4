use reldag_error::{Result, internal, not_supported};
use serde_json::Value;

use super::{
    SubqueryBuilder, field, has_field, indices_from_json_array, json_array, json_bool, json_i64,
    json_str, json_usize, parse_literal, parse_type, truncated,
};
use crate::builder::BuildContext;
use crate::rex::RexScalar;
use crate::rex::agg::{AggKind, RexAgg};
use crate::rex::case_expr::RexCase;
use crate::rex::operator::{RexFunctionOperator, RexOperator, SqlOperator};
use crate::rex::subquery::RexSubQuery;
use crate::rex::window::{
    NullsPosition, RexWindowFunction, SortDirection, SortField, WindowBound, WindowFunctionKind,
};

/// Parses scalar expressions, building nested plans for subqueries.
pub struct RexParser<'a> {
    subqueries: &'a dyn SubqueryBuilder,
}

impl<'a> RexParser<'a> {
    pub fn new(subqueries: &'a dyn SubqueryBuilder) -> Self {
        RexParser { subqueries }
    }

    pub fn parse_scalar_expr(&self, ctx: &mut BuildContext, expr: &Value) -> Result<RexScalar> {
        if !expr.is_object() {
            return Err(internal!(
                "Expected expression object, got {}",
                truncated(expr)
            ));
        }
        if has_field(expr, "input") {
            return Ok(RexScalar::AbstractInput(json_usize(field(expr, "input")?)?));
        }
        if has_field(expr, "literal") {
            return Ok(RexScalar::Literal(parse_literal(expr)?));
        }
        if has_field(expr, "op") {
            return match json_str(field(expr, "op")?)? {
                "CASE" => self.parse_case(ctx, expr),
                "$SCALAR_QUERY" => Ok(RexScalar::SubQuery(self.parse_subquery(ctx, expr)?)),
                _ => self.parse_operator(ctx, expr),
            };
        }
        Err(not_supported!(
            "Expression node {} not supported",
            truncated(expr)
        ))
    }

    pub fn parse_expr_array(&self, ctx: &mut BuildContext, arr: &Value) -> Result<Vec<RexScalar>> {
        json_array(arr)?
            .iter()
            .map(|expr| self.parse_scalar_expr(ctx, expr))
            .collect()
    }

    fn parse_operator(&self, ctx: &mut BuildContext, expr: &Value) -> Result<RexScalar> {
        let name = json_str(field(expr, "op")?)?;
        let mut operands = self.parse_expr_array(ctx, field(expr, "operands")?)?;
        let mut ty = parse_type(field(expr, "type")?)?;

        // Quantified comparisons are handled as functions.
        let op = match name {
            "PG_ANY" | "PG_ALL" => None,
            _ => SqlOperator::from_name(name),
        };

        if op == Some(SqlOperator::In) && has_field(expr, "subquery") {
            let subquery = self.parse_subquery(ctx, expr)?;
            operands.push(RexScalar::SubQuery(subquery));
        }

        if has_field(expr, "partition_keys") {
            let kind = WindowFunctionKind::from_name(name)?;
            let partition_keys = self.parse_expr_array(ctx, field(expr, "partition_keys")?)?;
            let order_keys_arr = field(expr, "order_keys")?;
            let (order_keys, collation) = self.parse_window_order(ctx, order_keys_arr)?;
            let lower_bound = self.parse_window_bound(ctx, field(expr, "lower_bound")?)?;
            let upper_bound = self.parse_window_bound(ctx, field(expr, "upper_bound")?)?;
            let is_rows = json_bool(field(expr, "is_rows")?)?;
            // Window results are nullable regardless of the input type.
            ty.nullable = true;

            return Ok(RexScalar::WindowFunction(Box::new(RexWindowFunction {
                kind,
                operands,
                partition_keys,
                order_keys,
                collation,
                lower_bound,
                upper_bound,
                is_rows,
                ty,
            })));
        }

        Ok(match op {
            Some(op) => RexScalar::Operator(RexOperator::new(op, operands, ty)),
            None => RexScalar::Function(RexFunctionOperator {
                name: name.to_string(),
                operands,
                ty,
            }),
        })
    }

    fn parse_window_order(
        &self,
        ctx: &mut BuildContext,
        arr: &Value,
    ) -> Result<(Vec<RexScalar>, Vec<SortField>)> {
        let mut keys = Vec::new();
        let mut collation = Vec::new();
        for (idx, key) in json_array(arr)?.iter().enumerate() {
            keys.push(self.parse_scalar_expr(ctx, field(key, "field")?)?);
            collation.push(parse_sort_field(key, idx)?);
        }
        Ok((keys, collation))
    }

    fn parse_window_bound(&self, ctx: &mut BuildContext, obj: &Value) -> Result<WindowBound> {
        let offset = match field(obj, "offset")? {
            Value::Null => None,
            offset => Some(Box::new(self.parse_scalar_expr(ctx, offset)?)),
        };
        Ok(WindowBound {
            unbounded: json_bool(field(obj, "unbounded")?)?,
            preceding: json_bool(field(obj, "preceding")?)?,
            following: json_bool(field(obj, "following")?)?,
            is_current_row: json_bool(field(obj, "is_current_row")?)?,
            offset,
            order_key: json_i64(field(obj, "order_key")?)?,
        })
    }

    /// Parse `CASE` operands: alternating WHEN/THEN pairs with an optional
    /// trailing ELSE.
    fn parse_case(&self, ctx: &mut BuildContext, expr: &Value) -> Result<RexScalar> {
        let operands = json_array(field(expr, "operands")?)?;
        if operands.len() < 2 {
            return Err(internal!(
                "CASE requires at least 2 operands, got {}",
                operands.len()
            ));
        }

        let mut when_then = Vec::with_capacity(operands.len() / 2);
        let mut else_expr = None;
        let mut iter = operands.iter();
        while let Some(when) = iter.next() {
            let when = self.parse_scalar_expr(ctx, when)?;
            match iter.next() {
                Some(then) => when_then.push((when, self.parse_scalar_expr(ctx, then)?)),
                None => else_expr = Some(Box::new(when)),
            }
        }

        Ok(RexScalar::Case(RexCase {
            when_then,
            else_expr,
        }))
    }

    fn parse_subquery(&self, ctx: &mut BuildContext, expr: &Value) -> Result<RexSubQuery> {
        json_array(field(expr, "operands")?)?;
        let ast = field(expr, "subquery")?;
        let ty = match expr.get("type") {
            Some(ty) if !ty.is_null() => Some(parse_type(ty)?),
            _ => None,
        };
        let dag = self.subqueries.build_subquery(ctx, ast)?;
        Ok(RexSubQuery { dag, ty })
    }
}

/// Parse direction and null ordering of a collation entry.
pub fn parse_sort_field(obj: &Value, field_idx: usize) -> Result<SortField> {
    Ok(SortField {
        field: field_idx,
        direction: SortDirection::from_name(json_str(field(obj, "direction")?)?),
        nulls: NullsPosition::from_name(json_str(field(obj, "nulls")?)?),
    })
}

pub fn parse_aggregate_expr(expr: &Value) -> Result<RexAgg> {
    let kind = AggKind::from_name(json_str(field(expr, "agg")?)?)?;
    let distinct = json_bool(field(expr, "distinct")?)?;
    let ty = parse_type(field(expr, "type")?)?;
    let operands = indices_from_json_array(field(expr, "operands")?)?;
    if operands.len() > 1 && (operands.len() != 2 || !kind.accepts_two_operands()) {
        return Err(not_supported!(
            "Multiple arguments for aggregates aren't supported"
        ));
    }
    Ok(RexAgg {
        kind,
        distinct,
        ty,
        operands,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::logical::dag::RelAlgDag;
    use crate::rex::literal::LiteralValue;

    struct NoSubqueries;

    impl SubqueryBuilder for NoSubqueries {
        fn build_subquery(&self, _ctx: &mut BuildContext, _ast: &Value) -> Result<Arc<RelAlgDag>> {
            Err(not_supported!("subqueries"))
        }
    }

    fn parse(expr: Value) -> Result<RexScalar> {
        let mut ctx = BuildContext::new();
        RexParser::new(&NoSubqueries).parse_scalar_expr(&mut ctx, &expr)
    }

    fn int_type() -> Value {
        json!({"type": "INTEGER", "nullable": true})
    }

    #[test]
    fn parse_case_with_else() {
        let expr = parse(json!({
            "op": "CASE",
            "operands": [
                {"input": 0},
                {"literal": 1, "type": "DECIMAL", "target_type": "INTEGER"},
                {"literal": 2, "type": "DECIMAL", "target_type": "INTEGER"},
            ],
            "type": int_type(),
        }))
        .unwrap();

        let RexScalar::Case(case) = expr else {
            panic!("expected case");
        };
        assert_eq!(1, case.when_then.len());
        assert_eq!(RexScalar::AbstractInput(0), case.when_then[0].0);
        let Some(RexScalar::Literal(lit)) = case.else_expr.as_deref() else {
            panic!("expected literal else");
        };
        assert_eq!(LiteralValue::Int64(2), lit.value);
    }

    #[test]
    fn parse_unknown_operator_as_function() {
        let expr = parse(json!({
            "op": "PG_ANY",
            "operands": [{"input": 1}],
            "type": int_type(),
        }))
        .unwrap();
        assert!(matches!(expr, RexScalar::Function(f) if f.name == "PG_ANY"));

        let expr = parse(json!({
            "op": "=",
            "operands": [{"input": 1}, {"input": 0}],
            "type": {"type": "BOOLEAN", "nullable": false},
        }))
        .unwrap();
        assert!(matches!(expr, RexScalar::Operator(op) if op.op == SqlOperator::Eq));
    }

    #[test]
    fn parse_window_function() {
        let bound = json!({
            "unbounded": true,
            "preceding": true,
            "following": false,
            "is_current_row": false,
            "offset": null,
            "order_key": 0,
        });
        let expr = parse(json!({
            "op": "RANK",
            "operands": [],
            "type": {"type": "BIGINT", "nullable": false},
            "partition_keys": [{"input": 0}],
            "order_keys": [{"field": {"input": 1}, "direction": "DESCENDING", "nulls": "FIRST"}],
            "lower_bound": bound,
            "upper_bound": bound,
            "is_rows": false,
        }))
        .unwrap();

        let RexScalar::WindowFunction(window) = expr else {
            panic!("expected window function");
        };
        assert_eq!(WindowFunctionKind::Rank, window.kind);
        assert!(window.ty.nullable);
        assert_eq!(vec![RexScalar::AbstractInput(1)], window.order_keys);
        assert_eq!(SortDirection::Descending, window.collation[0].direction);
        assert_eq!(NullsPosition::First, window.collation[0].nulls);
        assert!(window.lower_bound.unbounded);
    }

    #[test]
    fn parse_unknown_expression_not_supported() {
        let err = parse(json!({"foo": 1})).unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn parse_subquery_error_propagates() {
        let err = parse(json!({
            "op": "$SCALAR_QUERY",
            "operands": [],
            "subquery": {"rels": []},
        }))
        .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn aggregate_operand_count() {
        let agg = |name: &str, operands: Value| {
            parse_aggregate_expr(&json!({
                "agg": name,
                "distinct": false,
                "type": {"type": "BIGINT", "nullable": false},
                "operands": operands,
            }))
        };

        assert_eq!(vec![1], agg("COUNT", json!([1])).unwrap().operands);
        assert!(agg("COUNT", json!([1, 2])).unwrap_err().is_not_supported());
        assert!(agg("APPROX_COUNT_DISTINCT", json!([1, 2])).is_ok());
        assert!(agg("APPROX_COUNT_DISTINCT", json!([1, 2, 3])).unwrap_err().is_not_supported());
        assert!(agg("MEDIAN", json!([1])).unwrap_err().is_not_supported());
    }
}

use std::sync::Arc;

use reldag_error::{OptionExt, Result, ResultExt, ensure, internal, not_supported};
use serde_json::Value;
use tracing::trace;

use super::parse_rex::{RexParser, parse_aggregate_expr, parse_sort_field};
use super::{
    SubqueryBuilder, field, has_field, indices_from_json_array, int_literal_field, json_array,
    json_bool, json_i64, json_str, json_usize, parse_literal, parse_target_metainfo,
    strings_from_json_array, truncated,
};
use crate::builder::BuildContext;
use crate::catalog::{Catalog, MaterializedTableDescriptor, MaterializedTableRegistry, TableDescriptor};
use crate::config::BuildConfig;
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_aggregate::RelAggregate;
use crate::logical::rel_filter::RelFilter;
use crate::logical::rel_join::{JoinType, RelJoin};
use crate::logical::rel_modify::{ModifyOperation, RelModify};
use crate::logical::rel_project::{ModifyKind, ModifyManipulation, RelProject};
use crate::logical::rel_scan::{RelMatScan, RelScan};
use crate::logical::rel_sort::RelSort;
use crate::logical::rel_table_function::RelTableFunction;
use crate::logical::rel_union::RelUnion;
use crate::logical::rel_values::RelValues;
use crate::rex::RexScalar;
use crate::types::{SqlType, SqlTypeKind};

/// Turns the `rels` array of a plan into unbound nodes, one node per entry.
pub struct RelAlgDispatcher<'a> {
    catalog: &'a dyn Catalog,
    registry: Option<&'a MaterializedTableRegistry>,
    config: &'a BuildConfig,
    rex: RexParser<'a>,
    dag: RelAlgDag,
}

impl<'a> RelAlgDispatcher<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        registry: Option<&'a MaterializedTableRegistry>,
        config: &'a BuildConfig,
        subqueries: &'a dyn SubqueryBuilder,
    ) -> Self {
        RelAlgDispatcher {
            catalog,
            registry,
            config,
            rex: RexParser::new(subqueries),
            dag: RelAlgDag::new(),
        }
    }

    pub fn run(mut self, ctx: &mut BuildContext, rels: &Value) -> Result<RelAlgDag> {
        for rel in json_array(rels)? {
            let pos = node_id(rel)?;
            ensure!(
                pos == self.dag.len(),
                "Node id {pos} doesn't match its position {}",
                self.dag.len()
            );

            let rel_op = json_str(field(rel, "relOp")?)?;
            trace!(%pos, %rel_op, "dispatching node");

            let (inputs, op) = match rel_op {
                "EnumerableTableScan" => (self.no_inputs(rel)?, self.dispatch_table_scan(rel)?),
                "NurgiTableScan" => (Vec::new(), self.dispatch_materialized_scan(rel)?),
                "LogicalProject" => (self.inputs(rel)?, self.dispatch_project(ctx, rel)?),
                "LogicalFilter" => (self.inputs(rel)?, self.dispatch_filter(ctx, rel)?),
                "LogicalAggregate" => (self.inputs(rel)?, self.dispatch_aggregate(rel)?),
                "LogicalJoin" => (self.inputs(rel)?, self.dispatch_join(ctx, rel)?),
                "LogicalSort" => (self.inputs(rel)?, self.dispatch_sort(rel)?),
                "LogicalValues" => (Vec::new(), self.dispatch_values(rel)?),
                "LogicalTableModify" => {
                    let inputs = self.inputs(rel)?;
                    let op = self.dispatch_modify(rel, &inputs)?;
                    (inputs, op)
                }
                "LogicalTableFunctionScan" => {
                    (self.inputs(rel)?, self.dispatch_table_function(ctx, rel)?)
                }
                "LogicalUnion" => (self.inputs(rel)?, self.dispatch_union(rel)?),
                other => return Err(not_supported!("Node {other} not supported yet")),
            };

            let node = RelAlgNode::new(ctx.ids.next_id(), inputs, op);
            node.check_input_count()
                .context_fn(|| format!("Node at position {pos}"))?;
            self.dag.push(node);
        }

        Ok(self.dag)
    }

    /// Resolve the inputs of a node, either explicit ids or the previous node.
    fn inputs(&self, rel: &Value) -> Result<Vec<NodeId>> {
        if !has_field(rel, "inputs") {
            return Ok(vec![self.prev()?]);
        }
        strings_from_json_array(field(rel, "inputs")?)?
            .iter()
            .map(|s| {
                let pos: usize = s
                    .parse()
                    .map_err(|_| internal!("Invalid input id '{s}'"))?;
                self.dag.order().get(pos).copied().ok_or_else(|| {
                    internal!(
                        "Input id {pos} references a node not yet built (have {})",
                        self.dag.len()
                    )
                })
            })
            .collect()
    }

    fn no_inputs(&self, rel: &Value) -> Result<Vec<NodeId>> {
        let inputs = json_array(field(rel, "inputs")?)?;
        ensure!(inputs.is_empty(), "Scan nodes can't have inputs");
        Ok(Vec::new())
    }

    fn prev(&self) -> Result<NodeId> {
        self.dag.root().required("previous node")
    }

    fn table_from_scan_node(&self, rel: &Value) -> Result<Arc<TableDescriptor>> {
        let table = json_array(field(rel, "table")?)?;
        ensure!(
            table.len() == 2,
            "Expected [schema, table] pair, got {}",
            truncated(field(rel, "table")?)
        );
        let name = json_str(&table[1])?;
        self.catalog
            .table(name)
            .ok_or_else(|| internal!("Missing table in catalog: {name}"))
    }

    fn dispatch_table_scan(&self, rel: &Value) -> Result<RelAlgOperator> {
        let table = self.table_from_scan_node(rel)?;
        let field_names = strings_from_json_array(field(rel, "fieldNames")?)?;
        Ok(RelAlgOperator::Scan(RelScan { table, field_names }))
    }

    fn dispatch_materialized_scan(&self, rel: &Value) -> Result<RelAlgOperator> {
        let table = field(rel, "table")?;
        let id = json_i64(field(table, "id")?)?;
        let columns = json_array(field(table, "cols")?)?
            .iter()
            .map(|col| {
                let kind = SqlTypeKind::from_code(json_i64(field(col, "type")?)?)?;
                let nullable = json_bool(field(col, "nullable")?)?;
                Ok(SqlType::new(kind, nullable))
            })
            .collect::<Result<Vec<_>>>()?;

        let registry = self
            .registry
            .ok_or_else(|| internal!("Materialized scan without a table registry"))?;
        let data = registry.get(id)?;

        Ok(RelAlgOperator::MatScan(RelMatScan {
            table: Arc::new(MaterializedTableDescriptor { id, columns, data }),
        }))
    }

    fn dispatch_project(&self, ctx: &mut BuildContext, rel: &Value) -> Result<RelAlgOperator> {
        let exprs = self.rex.parse_expr_array(ctx, field(rel, "exprs")?)?;
        let fields = strings_from_json_array(field(rel, "fields")?)?;
        ensure!(
            exprs.len() == fields.len(),
            "Project has {} expressions but {} fields",
            exprs.len(),
            fields.len()
        );
        Ok(RelAlgOperator::Project(RelProject::new(exprs, fields)))
    }

    fn dispatch_filter(&self, ctx: &mut BuildContext, rel: &Value) -> Result<RelAlgOperator> {
        let condition = self.rex.parse_scalar_expr(ctx, field(rel, "condition")?)?;
        Ok(RelAlgOperator::Filter(RelFilter { condition }))
    }

    fn dispatch_aggregate(&self, rel: &Value) -> Result<RelAlgOperator> {
        let fields = strings_from_json_array(field(rel, "fields")?)?;
        let group = indices_from_json_array(field(rel, "group")?)?;
        for (idx, col) in group.iter().enumerate() {
            ensure!(idx == *col, "Group keys must be the leading columns, got {group:?}");
        }
        if has_field(rel, "groups") || has_field(rel, "indicator") {
            return Err(not_supported!("GROUP BY extensions not supported"));
        }
        let aggs = json_array(field(rel, "aggs")?)?
            .iter()
            .map(parse_aggregate_expr)
            .collect::<Result<Vec<_>>>()?;
        ensure!(
            fields.len() == group.len() + aggs.len(),
            "Aggregate has {} fields for {} outputs",
            fields.len(),
            group.len() + aggs.len()
        );

        Ok(RelAlgOperator::Aggregate(RelAggregate {
            group_count: group.len(),
            aggs,
            fields,
            is_nop: false,
        }))
    }

    fn dispatch_join(&self, ctx: &mut BuildContext, rel: &Value) -> Result<RelAlgOperator> {
        let join_type = JoinType::from_name(json_str(field(rel, "joinType")?)?)?;
        let condition = self.rex.parse_scalar_expr(ctx, field(rel, "condition")?)?;
        Ok(RelAlgOperator::Join(RelJoin {
            condition,
            join_type,
        }))
    }

    fn dispatch_sort(&self, rel: &Value) -> Result<RelAlgOperator> {
        let collation = json_array(field(rel, "collation")?)?
            .iter()
            .map(|entry| parse_sort_field(entry, json_usize(field(entry, "field")?)?))
            .collect::<Result<Vec<_>>>()?;

        let fetch = int_literal_field(rel, "fetch")?;
        let offset = int_literal_field(rel, "offset")?.unwrap_or(0);
        let offset =
            usize::try_from(offset).map_err(|_| internal!("Negative sort offset: {offset}"))?;

        Ok(RelAlgOperator::Sort(RelSort {
            collation,
            limit: fetch.filter(|n| *n > 0).map(|n| n as usize),
            offset,
            empty_result: fetch == Some(0),
        }))
    }

    fn dispatch_values(&self, rel: &Value) -> Result<RelAlgOperator> {
        let tuple_type = json_array(field(rel, "type")?)?
            .iter()
            .map(parse_target_metainfo)
            .collect::<Result<Vec<_>>>()?;

        if !json_array(field(rel, "inputs")?)?.is_empty() {
            return Err(not_supported!("Inputs not supported in logical values yet."));
        }

        let mut rows = Vec::new();
        for row in json_array(field(rel, "tuples")?)? {
            let values = json_array(row)?;
            ensure!(
                values.len() == tuple_type.len(),
                "Values row has {} columns, expected {}",
                values.len(),
                tuple_type.len()
            );
            let row = values
                .iter()
                .map(|value| {
                    ensure!(
                        has_field(value, "literal"),
                        "Values entries must be literals, got {}",
                        truncated(value)
                    );
                    parse_literal(value)
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        Ok(RelAlgOperator::Values(RelValues { tuple_type, rows }))
    }

    fn dispatch_modify(&mut self, rel: &Value, inputs: &[NodeId]) -> Result<RelAlgOperator> {
        let table = self.table_from_scan_node(rel)?;
        let operation = ModifyOperation::from_name(json_str(field(rel, "operation")?)?)?;
        let flattened = json_bool(field(rel, "flattened")?)?;

        let target_columns = match operation {
            ModifyOperation::Update => strings_from_json_array(field(rel, "updateColumnList")?)?,
            _ => Vec::new(),
        };

        let kind = match operation {
            ModifyOperation::Insert => None,
            ModifyOperation::Update => Some(ModifyKind::Update),
            ModifyOperation::Delete => Some(ModifyKind::Delete),
        };

        if let Some(kind) = kind {
            if table.is_view {
                return Err(not_supported!("{operation} of a view is unsupported."));
            }
            let mut varlen_update_required = false;
            for name in &target_columns {
                let col = table
                    .column(name)
                    .ok_or_else(|| internal!("Unknown column '{name}' in table {}", table.name))?;
                varlen_update_required |= is_varlen(col.ty.kind);
            }

            let input = inputs.first().copied().required("modify input")?;
            let RelAlgOperator::Project(proj) = &mut self.dag.node_mut(input).op else {
                return Err(internal!("{operation} expects a project as input"));
            };
            proj.manipulation = Some(ModifyManipulation {
                kind,
                table: table.clone(),
                target_columns: target_columns.clone(),
                varlen_update_required,
            });
        }

        Ok(RelAlgOperator::Modify(RelModify {
            table,
            operation,
            flattened,
            target_columns,
        }))
    }

    fn dispatch_table_function(
        &self,
        ctx: &mut BuildContext,
        rel: &Value,
    ) -> Result<RelAlgOperator> {
        let invocation = field(rel, "invocation")?;
        let function_name = json_str(field(invocation, "op")?)?.to_string();

        let mut inputs = Vec::new();
        let mut col_inputs = Vec::new();
        for operand in json_array(field(invocation, "operands")?)? {
            if is_cursor_cast(operand)? {
                ensure!(
                    col_inputs.is_empty(),
                    "Table function {function_name} has more than one cursor input"
                );
                if json_array(field(operand, "operands")?)?.len() != 1 {
                    return Err(not_supported!(
                        "Table functions currently only support one ResultSet input"
                    ));
                }

                let prior = self.prev()?;
                let prior_size = self.dag.output_size(prior)?;
                let types = json_array(field(invocation, "type")?)?;
                ensure!(
                    types.len() == prior_size,
                    "Cursor input has {prior_size} columns, invocation declares {}",
                    types.len()
                );

                // Forward every column of the prior node.
                for col in 0..prior_size {
                    inputs.push(RexScalar::AbstractInput(col));
                    col_inputs.push(col);
                }
                continue;
            }
            inputs.push(self.rex.parse_scalar_expr(ctx, operand)?);
        }

        let row_type = json_array(field(rel, "rowType")?)?;
        let target_exprs = (0..row_type.len()).map(RexScalar::Ref).collect();
        let fields = vec![String::new(); row_type.len()];

        Ok(RelAlgOperator::TableFunction(RelTableFunction {
            function_name,
            fields,
            col_inputs,
            inputs,
            target_exprs,
        }))
    }

    fn dispatch_union(&self, rel: &Value) -> Result<RelAlgOperator> {
        if !self.config.enable_union {
            return Err(not_supported!("UNION is not supported"));
        }
        let is_all = json_bool(field(rel, "all")?)?;
        if !is_all {
            return Err(not_supported!("UNION without ALL is not supported yet."));
        }
        Ok(RelAlgOperator::Union(RelUnion { is_all }))
    }
}

/// Get the positional id of a serialized node. Ids are stringified integers.
fn node_id(rel: &Value) -> Result<usize> {
    match field(rel, "id")? {
        Value::String(s) => s
            .parse()
            .map_err(|_| internal!("Invalid node id '{s}'")),
        other => json_usize(other),
    }
}

fn is_cursor_cast(operand: &Value) -> Result<bool> {
    if !has_field(operand, "op") || json_str(field(operand, "op")?)? != "CAST" {
        return Ok(false);
    }
    match operand.get("type") {
        Some(ty) => Ok(json_str(field(ty, "type")?)? == "CURSOR"),
        None => Ok(false),
    }
}

fn is_varlen(kind: SqlTypeKind) -> bool {
    matches!(
        kind,
        SqlTypeKind::Text
            | SqlTypeKind::Varchar
            | SqlTypeKind::Char
            | SqlTypeKind::Array
            | SqlTypeKind::Point
            | SqlTypeKind::LineString
            | SqlTypeKind::Polygon
            | SqlTypeKind::MultiPolygon
    )
}

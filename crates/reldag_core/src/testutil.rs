//! Helpers for building DAGs by hand in unit tests.

use std::sync::Arc;

use reldag_error::Result;

use crate::builder::NodeIdGenerator;
use crate::catalog::{ColumnDescriptor, TableDescriptor};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_aggregate::RelAggregate;
use crate::logical::rel_filter::RelFilter;
use crate::logical::rel_join::{JoinType, RelJoin};
use crate::logical::rel_project::RelProject;
use crate::logical::rel_scan::RelScan;
use crate::logical::rel_sort::RelSort;
use crate::optimizer::{OptimizeRule, OptimizerContext};
use crate::rex::RexScalar;
use crate::rex::agg::{AggKind, RexAgg};
use crate::rex::literal::RexLiteral;
use crate::rex::operator::{RexOperator, SqlOperator};
use crate::rex::window::{NullsPosition, SortDirection, SortField};
use crate::types::{SqlType, SqlTypeKind};

fn push(dag: &mut RelAlgDag, inputs: Vec<NodeId>, op: RelAlgOperator) -> NodeId {
    let id = dag.arena_len() as u32;
    dag.push(RelAlgNode::new(id, inputs, op))
}

pub fn int_type() -> SqlType {
    SqlType::new(SqlTypeKind::Int, true)
}

pub fn scan(dag: &mut RelAlgDag, name: &str, fields: &[&str]) -> NodeId {
    let table = TableDescriptor {
        id: dag.arena_len() as i64,
        name: name.to_string(),
        columns: fields
            .iter()
            .map(|f| ColumnDescriptor {
                name: f.to_string(),
                ty: int_type(),
            })
            .collect(),
        is_view: false,
    };
    push(
        dag,
        Vec::new(),
        RelAlgOperator::Scan(RelScan {
            table: Arc::new(table),
            field_names: fields.iter().map(|f| f.to_string()).collect(),
        }),
    )
}

pub fn project(dag: &mut RelAlgDag, input: NodeId, exprs: Vec<RexScalar>) -> NodeId {
    let fields = (0..exprs.len()).map(|i| format!("p{i}")).collect();
    push(
        dag,
        vec![input],
        RelAlgOperator::Project(RelProject::new(exprs, fields)),
    )
}

pub fn filter(dag: &mut RelAlgDag, input: NodeId, condition: RexScalar) -> NodeId {
    push(
        dag,
        vec![input],
        RelAlgOperator::Filter(RelFilter { condition }),
    )
}

pub fn aggregate(
    dag: &mut RelAlgDag,
    input: NodeId,
    group_count: usize,
    aggs: Vec<RexAgg>,
) -> NodeId {
    let fields = (0..group_count + aggs.len())
        .map(|i| format!("a{i}"))
        .collect();
    push(
        dag,
        vec![input],
        RelAlgOperator::Aggregate(RelAggregate {
            group_count,
            aggs,
            fields,
            is_nop: false,
        }),
    )
}

pub fn join(
    dag: &mut RelAlgDag,
    left: NodeId,
    right: NodeId,
    condition: RexScalar,
    join_type: JoinType,
) -> NodeId {
    push(
        dag,
        vec![left, right],
        RelAlgOperator::Join(RelJoin {
            condition,
            join_type,
        }),
    )
}

pub fn sort(dag: &mut RelAlgDag, input: NodeId, field: usize, limit: Option<usize>) -> NodeId {
    push(
        dag,
        vec![input],
        RelAlgOperator::Sort(RelSort {
            collation: vec![SortField {
                field,
                direction: SortDirection::Ascending,
                nulls: NullsPosition::Last,
            }],
            limit,
            offset: 0,
            empty_result: false,
        }),
    )
}

pub fn col(source: NodeId, index: usize) -> RexScalar {
    RexScalar::input(source, index)
}

pub fn lit(v: i64) -> RexScalar {
    RexScalar::Literal(RexLiteral::decimal(v))
}

pub fn lit_true() -> RexScalar {
    RexScalar::Literal(RexLiteral::boolean(true))
}

pub fn binary(op: SqlOperator, left: RexScalar, right: RexScalar) -> RexScalar {
    let ty = match op {
        SqlOperator::Plus | SqlOperator::Minus | SqlOperator::Multiply | SqlOperator::Divide => {
            int_type()
        }
        _ => SqlType::boolean(),
    };
    RexScalar::Operator(RexOperator::new(op, vec![left, right], ty))
}

pub fn eq(left: RexScalar, right: RexScalar) -> RexScalar {
    binary(SqlOperator::Eq, left, right)
}

pub fn agg(kind: AggKind, operands: Vec<usize>) -> RexAgg {
    RexAgg {
        kind,
        distinct: false,
        ty: int_type(),
        operands,
    }
}

pub fn project_of(dag: &RelAlgDag, id: NodeId) -> &RelProject {
    match &dag.node(id).op {
        RelAlgOperator::Project(proj) => proj,
        other => panic!("expected project, got {other:?}"),
    }
}

/// Run a single rule with a fresh context.
pub fn apply_rule(rule: &mut impl OptimizeRule, dag: &mut RelAlgDag) -> Result<()> {
    let mut ids = NodeIdGenerator::new();
    for _ in 0..dag.arena_len() {
        ids.next_id();
    }
    let mut ctx = OptimizerContext {
        ids: &mut ids,
        left_deep_join_roots: Vec::new(),
    };
    rule.optimize(&mut ctx, dag)
}

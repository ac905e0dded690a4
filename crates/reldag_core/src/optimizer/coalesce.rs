use std::collections::HashSet;

use reldag_error::{OptionExt, Result, ensure, internal};
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_compound::{CompoundTarget, RelCompound};
use crate::logical::rel_project::{ModifyManipulation, RelProject};
use crate::rex::agg::RexAgg;
use crate::rex::{RexInput, RexScalar};

/// Fuses Filter -> Project -> Aggregate -> Project chains into compound
/// nodes.
///
/// Recognized patterns are a filter feeding a project, a project feeding an
/// aggregate, and either of those followed by an aggregate and a final
/// project made of pass through columns. Every node in a pattern must be
/// the only consumer of the previous one. Filters rooting a left-deep join
/// chain are never part of a pattern.
#[derive(Debug, Default)]
pub struct CoalesceNodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoalesceState {
    Initial,
    Filter,
    FirstProject,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    /// Move to the only consumer of the current node, or past the end if
    /// there are zero or several.
    DefUse,
    /// Move to the first node not visited yet.
    InOrder,
}

/// Cursor over a snapshot of the live sequence.
///
/// Slots of nodes folded into a compound are cleared, the compound takes
/// the slot of the last node of its pattern.
#[derive(Debug)]
struct NodeCursor {
    pos: Option<usize>,
    visited: HashSet<usize>,
    node_count: usize,
}

impl NodeCursor {
    fn new(slots: &[Option<NodeId>]) -> Self {
        NodeCursor {
            pos: if slots.is_empty() { None } else { Some(0) },
            visited: HashSet::new(),
            node_count: slots.iter().flatten().count(),
        }
    }

    fn all_visited(&self) -> bool {
        self.visited.len() >= self.node_count
    }

    /// Node under the cursor, marking its slot as visited.
    fn current(&mut self, slots: &[Option<NodeId>]) -> Option<(usize, NodeId)> {
        let pos = self.pos?;
        self.visited.insert(pos);
        slots[pos].map(|id| (pos, id))
    }

    fn advance(&mut self, mode: Advance, dag: &RelAlgDag, slots: &[Option<NodeId>]) {
        match mode {
            Advance::DefUse => {
                let Some(pos) = self.pos else {
                    return;
                };
                let Some(id) = slots[pos] else {
                    self.pos = None;
                    return;
                };
                let mut only_use = None;
                let mut use_count = 0;
                for (idx, slot) in slots.iter().enumerate().skip(pos + 1) {
                    let Some(consumer) = slot else {
                        continue;
                    };
                    let uses = dag
                        .node(*consumer)
                        .inputs
                        .iter()
                        .filter(|input| **input == id)
                        .count();
                    use_count += uses;
                    if use_count > 1 {
                        self.pos = None;
                        return;
                    }
                    if uses == 1 {
                        only_use = Some(idx);
                    }
                }
                self.pos = only_use;
            }
            Advance::InOrder => {
                self.pos = (0..slots.len()).find(|idx| !self.visited.contains(idx));
            }
        }
    }
}

impl OptimizeRule for CoalesceNodes {
    fn optimize(&mut self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let mut slots: Vec<Option<NodeId>> = dag.order().iter().copied().map(Some).collect();
        let mut cursor = NodeCursor::new(&slots);
        let mut state = CoalesceState::Initial;
        let mut pattern: Vec<usize> = Vec::new();

        while !cursor.all_visited() {
            let current = cursor.current(&slots);
            let op = current.map(|(_, id)| &dag.node(id).op);

            match state {
                CoalesceState::Initial => match (current, op) {
                    (Some((pos, id)), Some(RelAlgOperator::Filter(_)))
                        if !ctx.left_deep_join_roots.contains(&id) =>
                    {
                        pattern.push(pos);
                        state = CoalesceState::Filter;
                        cursor.advance(Advance::DefUse, dag, &slots);
                    }
                    (Some((pos, _)), Some(RelAlgOperator::Project(_))) => {
                        pattern.push(pos);
                        state = CoalesceState::FirstProject;
                        cursor.advance(Advance::DefUse, dag, &slots);
                    }
                    _ => cursor.advance(Advance::InOrder, dag, &slots),
                },
                CoalesceState::Filter => match (current, op) {
                    (Some((pos, _)), Some(RelAlgOperator::Project(proj)))
                        if !proj.has_window_function_expr() =>
                    {
                        pattern.push(pos);
                        state = CoalesceState::FirstProject;
                        cursor.advance(Advance::DefUse, dag, &slots);
                    }
                    _ => {
                        state = CoalesceState::Initial;
                        pattern.clear();
                    }
                },
                CoalesceState::FirstProject => match (current, op) {
                    (Some((pos, _)), Some(RelAlgOperator::Aggregate(_))) => {
                        pattern.push(pos);
                        state = CoalesceState::Aggregate;
                        cursor.advance(Advance::DefUse, dag, &slots);
                    }
                    _ => {
                        if pattern.len() >= 2 {
                            create_compound(ctx, dag, &mut slots, &pattern)?;
                        }
                        state = CoalesceState::Initial;
                        pattern.clear();
                    }
                },
                CoalesceState::Aggregate => {
                    if let (Some((pos, _)), Some(RelAlgOperator::Project(proj))) = (current, op) {
                        if project_can_be_coalesced(dag, proj) {
                            pattern.push(pos);
                            cursor.advance(Advance::InOrder, dag, &slots);
                        }
                    }
                    create_compound(ctx, dag, &mut slots, &pattern)?;
                    state = CoalesceState::Initial;
                    pattern.clear();
                }
            }
        }

        if matches!(
            state,
            CoalesceState::FirstProject | CoalesceState::Aggregate
        ) && pattern.len() >= 2
        {
            create_compound(ctx, dag, &mut slots, &pattern)?;
        }

        Ok(())
    }
}

/// If a project following an aggregate only passes columns through.
///
/// Nested column references are only allowed for the first group key.
fn project_can_be_coalesced(dag: &RelAlgDag, proj: &RelProject) -> bool {
    proj.exprs.iter().all(|expr| match expr {
        RexScalar::Input(_) => true,
        other => nested_can_be_coalesced(dag, other),
    })
}

fn nested_can_be_coalesced(dag: &RelAlgDag, expr: &RexScalar) -> bool {
    match expr {
        RexScalar::Input(input) => input_can_be_coalesced(dag, input),
        RexScalar::Literal(_)
        | RexScalar::SubQuery(_)
        | RexScalar::Ref(_)
        | RexScalar::AbstractInput(_) => false,
        other => {
            let mut ok = true;
            // Infallible, the closure never errors.
            let _ = other.for_each_child(&mut |child| {
                ok = ok && nested_can_be_coalesced(dag, child);
                Ok(())
            });
            ok
        }
    }
}

fn input_can_be_coalesced(dag: &RelAlgDag, input: &RexInput) -> bool {
    match &dag.node(input.source).op {
        RelAlgOperator::Aggregate(agg) => input.index == 0 && agg.group_count > 0,
        _ => false,
    }
}

/// Replace the nodes at `pattern` with a single compound node.
fn create_compound(
    ctx: &mut OptimizerContext,
    dag: &mut RelAlgDag,
    slots: &mut [Option<NodeId>],
    pattern: &[usize],
) -> Result<()> {
    ensure!(
        (2..=4).contains(&pattern.len()),
        "Invalid coalesce pattern of {} nodes",
        pattern.len()
    );
    let ids = pattern
        .iter()
        .map(|pos| slots[*pos].required("coalesced node"))
        .collect::<Result<Vec<_>>>()?;

    let mut filter: Option<RexScalar> = None;
    let mut filter_node: Option<NodeId> = None;
    let mut scalar_sources: Vec<RexScalar> = Vec::new();
    let mut targets: Vec<CompoundTarget> = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut aggs: Vec<RexAgg> = Vec::new();
    let mut group_count = 0;
    let mut is_agg = false;
    let mut manipulation: Option<ModifyManipulation> = None;
    let mut first_project = true;
    let mut last_node: Option<NodeId> = None;

    for &id in &ids {
        match &dag.node(id).op {
            RelAlgOperator::Filter(node) => {
                ensure!(filter.is_none(), "Multiple filters in coalesce pattern");
                filter = Some(node.condition.clone());
                filter_node = Some(id);
            }
            RelAlgOperator::Project(proj) => {
                fields = proj.fields.clone();
                manipulation = proj.manipulation.clone();

                if first_project {
                    let mut exprs = proj.exprs.clone();
                    let input = dag.node(id).single_input()?;
                    if Some(input) == filter_node {
                        // The filter gets evaluated on the fly, read its
                        // input directly.
                        let filter_input = dag.node(input).single_input()?;
                        let output = dag.get_node_output(filter_input)?;
                        for expr in &mut exprs {
                            expr.for_each_input_mut(|col| {
                                if col.source == input {
                                    *col = output.get(col.index).copied().ok_or_else(|| {
                                        internal!(
                                            "Column {} out of range for filter input",
                                            col.index
                                        )
                                    })?;
                                }
                                Ok(())
                            })?;
                        }
                    }
                    targets = (0..exprs.len()).map(CompoundTarget::Source).collect();
                    scalar_sources = exprs;
                    first_project = false;
                } else if proj.is_simple() {
                    targets = proj
                        .exprs
                        .iter()
                        .map(|expr| reproject_target(expr, &targets))
                        .collect::<Result<_>>()?;
                } else {
                    let last = last_node.required("node preceding project")?;
                    let mut result = Vec::with_capacity(proj.exprs.len());
                    for expr in &proj.exprs {
                        if let RexScalar::Input(_) = expr {
                            result.push(reproject_target(expr, &targets)?);
                            continue;
                        }
                        let source = replace_last_node_inputs(expr, last, &scalar_sources)?;
                        result.push(CompoundTarget::Source(scalar_sources.len()));
                        scalar_sources.push(source);
                    }
                    targets = result;
                }
            }
            RelAlgOperator::Aggregate(agg) => {
                is_agg = true;
                fields = agg.fields.clone();
                aggs = agg.aggs.clone();
                group_count = agg.group_count;
                ensure!(
                    group_count <= scalar_sources.len(),
                    "Group count {group_count} exceeds {} scalar sources",
                    scalar_sources.len()
                );
                targets.clear();
                for group_idx in 0..group_count {
                    targets.push(CompoundTarget::Source(scalar_sources.len()));
                    scalar_sources.push(RexScalar::Ref(group_idx + 1));
                }
                targets.extend((0..aggs.len()).map(CompoundTarget::Agg));
            }
            _ => {
                return Err(internal!(
                    "Unexpected {} in coalesce pattern",
                    dag.node(id).op_name()
                ));
            }
        }
        last_node = Some(id);
    }

    let first = ids[0];
    let last = ids[ids.len() - 1];
    let input = dag.node(first).single_input()?;

    debug!(
        nodes = ?ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        is_agg,
        "creating compound node"
    );

    let compound = RelAlgNode::new(
        ctx.ids.next_id(),
        vec![input],
        RelAlgOperator::Compound(RelCompound {
            filter,
            scalar_sources,
            group_count,
            aggs,
            targets,
            fields,
            is_agg,
            manipulation,
        }),
    );
    let compound_id = dag.alloc(compound);
    dag.replace_in_order(last, compound_id)?;
    for (pos, id) in pattern.iter().zip(&ids).take(ids.len() - 1) {
        dag.remove(*id);
        slots[*pos] = None;
    }
    slots[pattern[pattern.len() - 1]] = Some(compound_id);
    dag.replace_input_everywhere(last, compound_id, None)?;

    Ok(())
}

fn reproject_target(expr: &RexScalar, targets: &[CompoundTarget]) -> Result<CompoundTarget> {
    let RexScalar::Input(input) = expr else {
        return Err(internal!("Expected column reference, got {expr}"));
    };
    targets
        .get(input.index)
        .copied()
        .ok_or_else(|| internal!("Column {} out of range for coalesced targets", input.index))
}

/// Copy `expr`, replacing references to `last` with the scalar source they
/// point at.
fn replace_last_node_inputs(
    expr: &RexScalar,
    last: NodeId,
    scalar_sources: &[RexScalar],
) -> Result<RexScalar> {
    let mut expr = expr.clone();
    expr.walk_mut(&mut |child| {
        if let RexScalar::Input(input) = child {
            if input.source == last {
                *child = scalar_sources
                    .get(input.index)
                    .cloned()
                    .ok_or_else(|| internal!("Column {} out of range for scalar sources", input.index))?;
            }
        }
        Ok(())
    })?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::agg::AggKind;
    use crate::rex::operator::SqlOperator;
    use crate::rex::window::{RexWindowFunction, WindowBound, WindowFunctionKind};
    use crate::testutil::{
        agg, aggregate, apply_rule, binary, col, eq, filter, lit, project, scan,
    };

    fn compound_of(dag: &RelAlgDag, id: NodeId) -> &RelCompound {
        match &dag.node(id).op {
            RelAlgOperator::Compound(compound) => compound,
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn filter_project_aggregate_fused() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let f = filter(&mut dag, t, eq(col(t, 0), lit(1)));
        let p = project(&mut dag, f, vec![col(f, 1), col(f, 0)]);
        let a = aggregate(&mut dag, p, 1, vec![agg(AggKind::Sum, vec![1])]);

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        assert_eq!(2, dag.len());
        let root = dag.root().unwrap();
        assert_eq!(t, dag.order()[0]);
        assert_eq!(vec![t], dag.node(root).inputs);
        assert!(!dag.is_live(f) && !dag.is_live(p) && !dag.is_live(a));

        let compound = compound_of(&dag, root);
        assert!(compound.is_agg);
        assert_eq!(Some(eq(col(t, 0), lit(1))), compound.filter);
        assert_eq!(
            vec![col(t, 1), col(t, 0), RexScalar::Ref(1)],
            compound.scalar_sources
        );
        assert_eq!(
            vec![CompoundTarget::Source(2), CompoundTarget::Agg(0)],
            compound.targets
        );
        assert_eq!(1, compound.group_count);
        assert_eq!(vec!["a0".to_string(), "a1".to_string()], compound.fields);
    }

    #[test]
    fn shared_project_blocks_aggregate() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let p = project(&mut dag, t, vec![col(t, 0), col(t, 1)]);
        let a = aggregate(&mut dag, p, 1, vec![agg(AggKind::Count, vec![1])]);
        project(&mut dag, p, vec![col(p, 1)]);
        project(&mut dag, a, vec![col(a, 0)]);

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        assert!(dag.is_live(p));
        assert!(dag.is_live(a));
        assert!(
            dag.nodes()
                .all(|(_, node)| !matches!(node.op, RelAlgOperator::Compound(_)))
        );
    }

    #[test]
    fn trailing_pass_through_project_fused() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let p = project(&mut dag, t, vec![col(t, 0), col(t, 1)]);
        let a = aggregate(&mut dag, p, 1, vec![agg(AggKind::Max, vec![1])]);
        let top = project(
            &mut dag,
            a,
            vec![col(a, 1), binary(SqlOperator::Eq, col(a, 0), col(a, 0))],
        );

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        assert_eq!(2, dag.len());
        assert!(!dag.is_live(top));
        let compound = compound_of(&dag, dag.root().unwrap());
        assert_eq!(
            vec![
                col(t, 0),
                col(t, 1),
                RexScalar::Ref(1),
                binary(SqlOperator::Eq, col(t, 0), col(t, 0)),
            ],
            compound.scalar_sources
        );
        assert_eq!(
            vec![CompoundTarget::Agg(0), CompoundTarget::Source(3)],
            compound.targets
        );
        assert_eq!(vec!["p0".to_string(), "p1".to_string()], compound.fields);
    }

    #[test]
    fn computed_project_after_aggregate_left_alone() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let p = project(&mut dag, t, vec![col(t, 0), col(t, 1)]);
        let a = aggregate(&mut dag, p, 1, vec![agg(AggKind::Sum, vec![1])]);
        let top = project(
            &mut dag,
            a,
            vec![binary(SqlOperator::Plus, col(a, 1), lit(1))],
        );

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        assert_eq!(3, dag.len());
        let compound = dag.order()[1];
        assert!(compound_of(&dag, compound).is_agg);
        assert_eq!(Some(top), dag.root());
        assert_eq!(vec![compound], dag.node(top).inputs);
        assert_eq!(
            vec![binary(SqlOperator::Plus, col(compound, 1), lit(1))],
            crate::testutil::project_of(&dag, top).exprs
        );
    }

    fn row_number(partition: RexScalar) -> RexScalar {
        RexScalar::WindowFunction(Box::new(RexWindowFunction {
            kind: WindowFunctionKind::RowNumber,
            operands: Vec::new(),
            partition_keys: vec![partition],
            order_keys: Vec::new(),
            collation: Vec::new(),
            lower_bound: WindowBound::default(),
            upper_bound: WindowBound::default(),
            is_rows: false,
            ty: crate::testutil::int_type(),
        }))
    }

    #[test]
    fn window_project_after_filter_not_fused() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let f = filter(&mut dag, t, eq(col(t, 0), lit(1)));
        let p = project(&mut dag, f, vec![col(f, 0), row_number(col(f, 1))]);

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        assert_eq!(&[t, f, p], dag.order());
    }

    #[test]
    fn window_project_starts_aggregate_pattern() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let p = project(&mut dag, t, vec![col(t, 0), row_number(col(t, 1))]);
        let top = project(&mut dag, p, vec![col(p, 1)]);
        let t2 = scan(&mut dag, "u", &["x", "y"]);
        let wp = project(&mut dag, t2, vec![row_number(col(t2, 0)), col(t2, 1)]);
        let a = aggregate(&mut dag, wp, 1, vec![agg(AggKind::Count, vec![1])]);

        apply_rule(&mut CoalesceNodes, &mut dag).unwrap();

        // Without an aggregate the window project stays on its own.
        assert!(dag.is_live(p) && dag.is_live(top));
        assert!(!dag.is_live(wp) && !dag.is_live(a));
        let root = dag.root().unwrap();
        let compound = compound_of(&dag, root);
        assert!(compound.is_agg);
        assert_eq!(row_number(col(t2, 0)), compound.scalar_sources[0]);
    }

    #[test]
    fn left_deep_join_filter_not_fused() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a"]);
        let f = filter(&mut dag, t, eq(col(t, 0), lit(1)));
        let p = project(&mut dag, f, vec![col(f, 0)]);

        let mut ids = crate::builder::NodeIdGenerator::new();
        for _ in 0..dag.arena_len() {
            ids.next_id();
        }
        let mut ctx = OptimizerContext {
            ids: &mut ids,
            left_deep_join_roots: vec![f],
        };
        CoalesceNodes.optimize(&mut ctx, &mut dag).unwrap();

        assert_eq!(&[t, f, p], dag.order());
    }
}

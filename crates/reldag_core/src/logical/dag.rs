use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reldag_error::{Result, internal};

use super::node::{RelAlgNode, RelAlgOperator};
use crate::rex::RexInput;

/// Handle to a node in a [`RelAlgDag`] arena.
///
/// Handles stay valid for the lifetime of the DAG. Removing a node from the
/// live sequence doesn't free its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Relational algebra DAG.
///
/// Nodes live in an arena and reference their inputs by [`NodeId`]. The live
/// sequence holds the nodes still part of the plan in execution order, every
/// node appears after its inputs and the last node is the root. Rewrites
/// drop nodes from the sequence without freeing them, so stale references
/// can always be looked up (and detected by validation).
#[derive(Debug, Clone, Default)]
pub struct RelAlgDag {
    nodes: Vec<RelAlgNode>,
    order: Vec<NodeId>,
    subqueries: Vec<Arc<RelAlgDag>>,
}

impl RelAlgDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node to the end of the live sequence, making it the root.
    pub fn push(&mut self, node: RelAlgNode) -> NodeId {
        let id = self.alloc(node);
        self.order.push(id);
        id
    }

    /// Add a node to the arena without placing it in the live sequence.
    pub fn alloc(&mut self, node: RelAlgNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: RelAlgNode) -> Result<NodeId> {
        let pos = self.live_position(anchor)?;
        let id = self.alloc(node);
        self.order.insert(pos + 1, id);
        Ok(id)
    }

    pub fn insert_before(&mut self, anchor: NodeId, node: RelAlgNode) -> Result<NodeId> {
        let pos = self.live_position(anchor)?;
        let id = self.alloc(node);
        self.order.insert(pos, id);
        Ok(id)
    }

    /// Put `id` in the live sequence slot currently held by `old`.
    pub fn replace_in_order(&mut self, old: NodeId, id: NodeId) -> Result<()> {
        let pos = self.live_position(old)?;
        self.order[pos] = id;
        Ok(())
    }

    /// Drop a node from the live sequence.
    pub fn remove(&mut self, id: NodeId) {
        self.order.retain(|n| *n != id);
    }

    pub fn node(&self, id: NodeId) -> &RelAlgNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut RelAlgNode {
        &mut self.nodes[id.0]
    }

    /// Last node in the live sequence.
    pub fn root(&self) -> Option<NodeId> {
        self.order.last().copied()
    }

    /// Iterate live nodes in execution order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &RelAlgNode)> + '_ {
        self.order.iter().map(|id| (*id, &self.nodes[id.0]))
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of nodes ever allocated, live or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|n| *n == id)
    }

    fn live_position(&self, id: NodeId) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| internal!("Node {id} is not part of the DAG"))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.order.contains(&id)
    }

    /// Live nodes having `id` as an input, in execution order.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.inputs.contains(&id))
            .map(|(consumer, _)| consumer)
            .collect()
    }

    /// Number of input slots of live nodes referencing `id`.
    pub fn use_count(&self, id: NodeId) -> usize {
        self.nodes()
            .map(|(_, node)| node.inputs.iter().filter(|input| **input == id).count())
            .sum()
    }

    pub fn subqueries(&self) -> &[Arc<RelAlgDag>] {
        &self.subqueries
    }

    pub fn register_subquery(&mut self, subquery: Arc<RelAlgDag>) {
        self.subqueries.push(subquery);
    }

    /// Clear execution state from every node.
    ///
    /// Subqueries shared with a live expression elsewhere are left alone.
    pub fn reset_query_execution_state(&mut self) {
        for node in &mut self.nodes {
            node.reset_query_execution_state();
        }
        for subquery in &mut self.subqueries {
            if let Some(subquery) = Arc::get_mut(subquery) {
                subquery.reset_query_execution_state();
            }
        }
    }

    /// Replace `old` with `new` in the inputs of `node` and rebind every
    /// column reference to `old` in its expressions.
    ///
    /// `mapping` translates column indices of `old` into column indices of
    /// `new`. Without a mapping indices are kept.
    ///
    /// A single input node consuming `old` directly binds against the output
    /// of its input, so its references are resolved through the output of
    /// `new`. Joins, and nodes seeing `old` through a join, reference `new`
    /// itself.
    pub fn replace_input(
        &mut self,
        node: NodeId,
        old: NodeId,
        new: NodeId,
        mapping: Option<&HashMap<usize, usize>>,
    ) -> Result<()> {
        let target = &self.nodes[node.0];
        let direct = target.inputs.contains(&old);
        let new_output = if direct && !target.op.is_join() {
            self.get_node_output(new)?
        } else {
            (0..self.output_size(new)?)
                .map(|idx| RexInput::new(new, idx))
                .collect()
        };
        let resolve = |idx: usize| -> Result<RexInput> {
            new_output
                .get(idx)
                .copied()
                .ok_or_else(|| internal!("Column {idx} out of range for replacement {new}"))
        };

        let target = &mut self.nodes[node.0];
        for input in &mut target.inputs {
            if *input == old {
                *input = new;
            }
        }

        let map_index = |idx: usize| -> Result<usize> {
            match mapping {
                Some(mapping) => mapping
                    .get(&idx)
                    .copied()
                    .ok_or_else(|| internal!("Missing index {idx} in input mapping for {old}")),
                None => Ok(idx),
            }
        };

        target.for_each_expr_mut(|expr| {
            expr.for_each_input_mut(|input| {
                if input.source == old {
                    *input = resolve(map_index(input.index)?)?;
                }
                Ok(())
            })
        })?;

        if direct && mapping.is_some() {
            match &mut target.op {
                RelAlgOperator::Aggregate(agg) => {
                    for agg in &mut agg.aggs {
                        for operand in &mut agg.operands {
                            *operand = map_index(*operand)?;
                        }
                    }
                }
                RelAlgOperator::Sort(sort) => {
                    for field in &mut sort.collation {
                        field.field = map_index(field.field)?;
                    }
                }
                RelAlgOperator::TableFunction(func) => {
                    for col in &mut func.col_inputs {
                        *col = map_index(*col)?;
                    }
                }
                _ => (),
            }
        }

        Ok(())
    }

    /// Call [`RelAlgDag::replace_input`] on every live node other than `new`.
    pub fn replace_input_everywhere(
        &mut self,
        old: NodeId,
        new: NodeId,
        mapping: Option<&HashMap<usize, usize>>,
    ) -> Result<()> {
        let live: Vec<_> = self.order.iter().copied().filter(|n| *n != new).collect();
        for node in live {
            self.replace_input(node, old, new, mapping)?;
        }
        Ok(())
    }

    /// Remove a single input node from the plan, pointing its consumers at
    /// its input.
    pub fn bypass(&mut self, id: NodeId, mapping: Option<&HashMap<usize, usize>>) -> Result<()> {
        let input = self.nodes[id.0].single_input()?;
        self.replace_input_everywhere(id, input, mapping)?;
        self.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::rel_filter::RelFilter;
    use crate::logical::rel_join::{JoinType, RelJoin};
    use crate::logical::rel_project::RelProject;
    use crate::logical::rel_union::RelUnion;
    use crate::rex::RexScalar;
    use crate::rex::literal::RexLiteral;

    fn project(id: u32, inputs: Vec<NodeId>, exprs: Vec<RexScalar>) -> RelAlgNode {
        let fields = (0..exprs.len()).map(|i| format!("f{i}")).collect();
        RelAlgNode::new(
            id,
            inputs,
            RelAlgOperator::Project(RelProject::new(exprs, fields)),
        )
    }

    fn literal_project(id: u32) -> RelAlgNode {
        project(
            id,
            Vec::new(),
            vec![RexScalar::Literal(RexLiteral::decimal(1)); 3],
        )
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let c = dag.push(literal_project(2));
        let b = dag.insert_after(a, literal_project(1)).unwrap();
        assert_eq!(&[a, b, c], dag.order());

        dag.remove(b);
        assert_eq!(&[a, c], dag.order());
        assert!(!dag.is_live(b));
        assert_eq!(3, dag.arena_len());
        assert_eq!(Some(c), dag.root());
    }

    #[test]
    fn replace_input_with_mapping() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let b = dag.push(literal_project(1));
        let c = dag.push(project(
            2,
            vec![a],
            vec![RexScalar::input(a, 2), RexScalar::input(a, 0)],
        ));

        let mapping = HashMap::from([(0, 1), (2, 0)]);
        dag.replace_input(c, a, b, Some(&mapping)).unwrap();

        let node = dag.node(c);
        assert_eq!(vec![b], node.inputs);
        let RelAlgOperator::Project(proj) = &node.op else {
            panic!("expected project");
        };
        assert_eq!(
            vec![RexScalar::input(b, 0), RexScalar::input(b, 1)],
            proj.exprs
        );
    }

    #[test]
    fn replace_input_missing_mapping_is_internal() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let b = dag.push(literal_project(1));
        let c = dag.push(project(2, vec![a], vec![RexScalar::input(a, 1)]));

        let mapping = HashMap::from([(0, 0)]);
        let err = dag.replace_input(c, a, b, Some(&mapping)).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn bypass_rebinds_consumers() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let f = dag.push(RelAlgNode::new(
            1,
            vec![a],
            RelAlgOperator::Filter(RelFilter {
                condition: RexScalar::Literal(RexLiteral::boolean(true)),
            }),
        ));
        let p = dag.push(project(2, vec![f], vec![RexScalar::input(f, 1)]));

        dag.bypass(f, None).unwrap();
        assert_eq!(&[a, p], dag.order());
        assert_eq!(vec![a], dag.node(p).inputs);
        assert_eq!(1, dag.use_count(a));
        assert_eq!(vec![p], dag.consumers(a));
    }

    fn join(id: u32, left: NodeId, right: NodeId) -> RelAlgNode {
        RelAlgNode::new(
            id,
            vec![left, right],
            RelAlgOperator::Join(RelJoin {
                condition: RexScalar::Literal(RexLiteral::boolean(true)),
                join_type: JoinType::Inner,
            }),
        )
    }

    #[test]
    fn replace_input_of_join_keeps_replacement_id() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let b = dag.push(literal_project(1));
        let inner = dag.push(join(2, a, b));
        let c = dag.push(literal_project(3));
        let outer = dag.push(join(4, inner, c));
        if let RelAlgOperator::Join(j) = &mut dag.node_mut(outer).op {
            j.condition = RexScalar::input(inner, 4);
        }
        let p = dag.push(project(5, vec![outer], vec![RexScalar::input(inner, 5)]));
        let other = dag.push(join(6, a, b));

        dag.replace_input_everywhere(inner, other, None).unwrap();

        let RelAlgOperator::Join(j) = &dag.node(outer).op else {
            panic!("expected join");
        };
        assert_eq!(RexScalar::input(other, 4), j.condition);
        let RelAlgOperator::Project(proj) = &dag.node(p).op else {
            panic!("expected project");
        };
        assert_eq!(vec![RexScalar::input(other, 5)], proj.exprs);
    }

    #[test]
    fn bypass_into_join_resolves_join_inputs() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        let b = dag.push(literal_project(1));
        let j = dag.push(join(2, a, b));
        let f = dag.push(RelAlgNode::new(
            3,
            vec![j],
            RelAlgOperator::Filter(RelFilter {
                condition: RexScalar::Literal(RexLiteral::boolean(true)),
            }),
        ));
        let p = dag.push(project(4, vec![f], vec![RexScalar::input(f, 4)]));

        dag.bypass(f, None).unwrap();

        let RelAlgOperator::Project(proj) = &dag.node(p).op else {
            panic!("expected project");
        };
        assert_eq!(vec![RexScalar::input(b, 1)], proj.exprs);
    }

    #[test]
    fn use_count_counts_slots() {
        let mut dag = RelAlgDag::new();
        let a = dag.push(literal_project(0));
        dag.push(RelAlgNode::new(
            1,
            vec![a, a],
            RelAlgOperator::Union(RelUnion { is_all: true }),
        ));
        assert_eq!(2, dag.use_count(a));
        assert_eq!(1, dag.consumers(a).len());
    }
}

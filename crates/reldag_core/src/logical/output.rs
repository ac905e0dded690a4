//! Output shape resolution.
//!
//! A node's output is the ordered list of column references a consumer binds
//! against. Most nodes produce their own columns. Filter, Sort and Modify
//! expose their input's column count under their own id. Joins expose the
//! columns of each direct input in order, so a join nested in another join
//! is referenced by its own id.

use std::collections::HashSet;

use reldag_error::{Result, internal};

use super::dag::{NodeId, RelAlgDag};
use super::node::RelAlgOperator;
use crate::rex::{RexInput, RexScalar};

fn n_outputs(id: NodeId, n: usize) -> Vec<RexInput> {
    (0..n).map(|idx| RexInput::new(id, idx)).collect()
}

impl RelAlgDag {
    /// Get the output columns of a node as references consumers bind to.
    pub fn get_node_output(&self, id: NodeId) -> Result<Vec<RexInput>> {
        self.node_output_inner(id, 0)
    }

    /// Number of output columns of a node.
    pub fn output_size(&self, id: NodeId) -> Result<usize> {
        self.output_size_inner(id, 0)
    }

    fn check_depth(&self, id: NodeId, depth: usize) -> Result<()> {
        if depth > self.arena_len() {
            return Err(internal!("Cycle detected while resolving output of {id}"));
        }
        Ok(())
    }

    fn node_output_inner(&self, id: NodeId, depth: usize) -> Result<Vec<RexInput>> {
        self.check_depth(id, depth)?;
        let node = self.node(id);
        match &node.op {
            RelAlgOperator::Join(_) | RelAlgOperator::LeftDeepJoin(_) => {
                let mut output = Vec::new();
                for input in &node.inputs {
                    output.extend(n_outputs(
                        *input,
                        self.output_size_inner(*input, depth + 1)?,
                    ));
                }
                Ok(output)
            }
            _ => Ok(n_outputs(id, self.output_size_inner(id, depth)?)),
        }
    }

    fn output_size_inner(&self, id: NodeId, depth: usize) -> Result<usize> {
        self.check_depth(id, depth)?;
        let node = self.node(id);
        Ok(match &node.op {
            RelAlgOperator::Scan(scan) => scan.field_names.len(),
            RelAlgOperator::MatScan(scan) => scan.table.columns.len(),
            RelAlgOperator::Values(values) => values.tuple_type.len(),
            RelAlgOperator::Project(proj) => proj.exprs.len(),
            RelAlgOperator::Aggregate(agg) => agg.output_size(),
            RelAlgOperator::Compound(compound) => compound.output_size(),
            RelAlgOperator::TableFunction(func) => func.target_exprs.len(),
            RelAlgOperator::Union(_)
            | RelAlgOperator::Filter(_)
            | RelAlgOperator::Sort(_)
            | RelAlgOperator::Modify(_) => self.output_size_inner(node.input(0)?, depth + 1)?,
            RelAlgOperator::Join(_) | RelAlgOperator::LeftDeepJoin(_) => {
                let mut size = 0;
                for input in &node.inputs {
                    size += self.output_size_inner(*input, depth + 1)?;
                }
                size
            }
        })
    }

    /// Name of an output column.
    pub fn field_name(&self, id: NodeId, idx: usize) -> Result<String> {
        self.field_name_inner(id, idx, 0)
    }

    fn field_name_inner(&self, id: NodeId, idx: usize, depth: usize) -> Result<String> {
        self.check_depth(id, depth)?;
        let node = self.node(id);
        let missing = || internal!("Column {idx} out of range for {}", node.op_name());
        match &node.op {
            RelAlgOperator::Scan(scan) => scan.field_names.get(idx).cloned().ok_or_else(missing),
            RelAlgOperator::MatScan(scan) => {
                if idx < scan.table.columns.len() {
                    Ok(scan.field_name(idx))
                } else {
                    Err(missing())
                }
            }
            RelAlgOperator::Values(values) => values
                .tuple_type
                .get(idx)
                .map(|t| t.name.clone())
                .ok_or_else(missing),
            RelAlgOperator::Project(proj) => proj.fields.get(idx).cloned().ok_or_else(missing),
            RelAlgOperator::Aggregate(agg) => agg.fields.get(idx).cloned().ok_or_else(missing),
            RelAlgOperator::Compound(compound) => {
                compound.fields.get(idx).cloned().ok_or_else(missing)
            }
            RelAlgOperator::TableFunction(func) => {
                func.fields.get(idx).cloned().ok_or_else(missing)
            }
            RelAlgOperator::Filter(_)
            | RelAlgOperator::Sort(_)
            | RelAlgOperator::Union(_)
            | RelAlgOperator::Modify(_) => self.field_name_inner(node.input(0)?, idx, depth + 1),
            RelAlgOperator::Join(_) | RelAlgOperator::LeftDeepJoin(_) => {
                let mut offset = 0;
                for input in &node.inputs {
                    let size = self.output_size_inner(*input, depth + 1)?;
                    if idx < offset + size {
                        return self.field_name_inner(*input, idx - offset, depth + 1);
                    }
                    offset += size;
                }
                Err(missing())
            }
        }
    }

    /// Columns known to hold the same values as column `col` of `id`,
    /// found by following single input nodes towards the leaves.
    ///
    /// The starting column is always included.
    pub fn equivalent_columns(&self, id: NodeId, col: usize) -> HashSet<RexInput> {
        let mut equiv = HashSet::new();
        let mut cur = RexInput::new(id, col);
        equiv.insert(cur);

        for _ in 0..self.arena_len() {
            let node = self.node(cur.source);
            if node.inputs.len() != 1 {
                break;
            }
            let next = match &node.op {
                RelAlgOperator::Project(proj) => match proj.exprs.get(cur.index) {
                    Some(RexScalar::Input(input)) => *input,
                    _ => break,
                },
                RelAlgOperator::Aggregate(agg) => {
                    if cur.index >= agg.group_count {
                        break;
                    }
                    RexInput::new(node.inputs[0], cur.index)
                }
                RelAlgOperator::Filter(_) | RelAlgOperator::Sort(_) => {
                    RexInput::new(node.inputs[0], cur.index)
                }
                _ => break,
            };
            if !equiv.insert(next) {
                break;
            }
            cur = next;
        }

        equiv
    }

    /// If two sorts order rows the same way, following column equivalences
    /// through projections and group keys.
    pub fn has_equiv_collation_of(&self, a: NodeId, b: NodeId) -> Result<bool> {
        let (RelAlgOperator::Sort(sort_a), RelAlgOperator::Sort(sort_b)) =
            (&self.node(a).op, &self.node(b).op)
        else {
            return Err(internal!("Collation equivalence requires two sorts"));
        };

        if sort_a.collation.len() != sort_b.collation.len() {
            return Ok(false);
        }

        for (field_a, field_b) in sort_a.collation.iter().zip(&sort_b.collation) {
            if field_a.direction != field_b.direction || field_a.nulls != field_b.nulls {
                return Ok(false);
            }
            let equiv_a = self.equivalent_columns(a, field_a.field);
            let equiv_b = self.equivalent_columns(b, field_b.field);
            if equiv_a.is_disjoint(&equiv_b) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// If a project outputs its input's columns unchanged (possibly
    /// reordered).
    pub fn project_is_identity(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id);
        let RelAlgOperator::Project(proj) = &node.op else {
            return Ok(false);
        };
        if !proj.is_simple() {
            return Ok(false);
        }
        let input = node.single_input()?;
        if matches!(
            self.node(input).op,
            RelAlgOperator::Join(_) | RelAlgOperator::LeftDeepJoin(_)
        ) {
            return Ok(false);
        }
        if proj.exprs.len() != self.output_size(input)? {
            return Ok(false);
        }
        Ok(proj
            .exprs
            .iter()
            .all(|expr| matches!(expr, RexScalar::Input(col) if col.source == input)))
    }

    /// If a project changes the name of any column it passes through.
    pub fn project_is_renaming(&self, id: NodeId) -> Result<bool> {
        let RelAlgOperator::Project(proj) = &self.node(id).op else {
            return Ok(false);
        };
        for (expr, field) in proj.exprs.iter().zip(&proj.fields) {
            if let RexScalar::Input(col) = expr {
                if self.field_name(col.source, col.index)? != *field {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

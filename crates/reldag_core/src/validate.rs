//! Structural checks run after a DAG is built.

use std::collections::HashSet;

use reldag_error::{Result, internal};
use tracing::trace;

use crate::logical::dag::{NodeId, RelAlgDag};

/// Check the DAG is internally consistent.
///
/// Nodes reachable from the root must hold bound column references only,
/// each pointing at a node that is itself reachable. Nothing may consume the
/// root.
pub fn validate_dag(dag: &RelAlgDag) -> Result<()> {
    let Some(root) = dag.root() else {
        return Ok(());
    };

    if dag.use_count(root) != 0 {
        return Err(internal!("Root {} has consumers", dag.node(root)));
    }

    let reachable = reachable_from(dag, root);
    trace!(reachable = reachable.len(), live = dag.len(), "validating dag");

    for id in &reachable {
        let node = dag.node(*id);
        node.for_each_expr(|expr| {
            if expr.has_abstract_input() {
                return Err(internal!("{} holds unbound input in {}", node, expr));
            }
            expr.for_each_input(|input| {
                if !reachable.contains(&input.source) {
                    return Err(internal!(
                        "{} references unreachable node {}",
                        node,
                        input.source
                    ));
                }
                Ok(())
            })
        })?;
    }

    Ok(())
}

fn reachable_from(dag: &RelAlgDag, root: NodeId) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        stack.extend(dag.node(id).inputs.iter().copied());
    }
    seen
}

//! Resolves positional expression inputs into concrete column references.

use reldag_error::{Result, ResultExt};
use tracing::trace;

use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;
use crate::rex::{RexInput, RexScalar};

/// Bind every `AbstractInput` in the DAG to the output of the owning node's
/// inputs.
///
/// Filters, projects and table functions bind against their single input.
/// Joins bind against their own output, the columns of both direct inputs.
/// Top level subquery expressions are left as is.
pub fn bind_inputs(dag: &mut RelAlgDag) -> Result<()> {
    let order = dag.order().to_vec();
    for id in order {
        bind_node(dag, id).context_fn(|| format!("Failed to bind {}", dag.node(id)))?;
    }
    Ok(())
}

fn bind_node(dag: &mut RelAlgDag, id: NodeId) -> Result<()> {
    let output = match &dag.node(id).op {
        RelAlgOperator::Filter(_)
        | RelAlgOperator::Project(_)
        | RelAlgOperator::TableFunction(_) => {
            let input = dag.node(id).single_input()?;
            dag.get_node_output(input)?
        }
        RelAlgOperator::Join(_) => dag.get_node_output(id)?,
        _ => return Ok(()),
    };

    trace!(node = %id, columns = output.len(), "binding node");

    let node = dag.node_mut(id);
    match &mut node.op {
        RelAlgOperator::Filter(filter) => filter.condition.bind_inputs(&output),
        RelAlgOperator::Join(join) => join.condition.bind_inputs(&output),
        RelAlgOperator::Project(proj) => bind_exprs(&mut proj.exprs, &output),
        RelAlgOperator::TableFunction(func) => bind_exprs(&mut func.inputs, &output),
        _ => Ok(()),
    }
}

fn bind_exprs(exprs: &mut [RexScalar], output: &[RexInput]) -> Result<()> {
    for expr in exprs {
        if matches!(expr, RexScalar::SubQuery(_)) {
            continue;
        }
        expr.bind_inputs(output)?;
    }
    Ok(())
}

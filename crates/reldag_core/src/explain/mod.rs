pub mod explainable;

use explainable::{ExplainConfig, ExplainEntry, Explainable};
use serde::{Deserialize, Serialize};

use crate::logical::dag::{NodeId, RelAlgDag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainedDag {
    /// The main plan.
    pub base: Option<ExplainNode>,
    /// Subqueries referenced from the main plan.
    pub subqueries: Vec<ExplainedDag>,
}

impl ExplainedDag {
    pub fn new(verbose: bool, dag: &RelAlgDag) -> Self {
        let config = ExplainConfig { verbose };
        Self::new_with_config(config, dag)
    }

    fn new_with_config(config: ExplainConfig, dag: &RelAlgDag) -> Self {
        let base = dag
            .root()
            .map(|root| ExplainNode::walk(config, dag, root, 0));
        let subqueries = dag
            .subqueries()
            .iter()
            .map(|sub| Self::new_with_config(config, sub))
            .collect();

        ExplainedDag { base, subqueries }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    fn walk(config: ExplainConfig, dag: &RelAlgDag, id: NodeId, depth: usize) -> Self {
        let node = dag.node(id);
        let entry = node.explain_entry(config);

        // Malformed graphs can contain cycles, stop descending once we've gone
        // deeper than the number of nodes.
        let children = if depth > dag.arena_len() {
            Vec::new()
        } else {
            node.inputs
                .iter()
                .map(|input| Self::walk(config, dag, *input, depth + 1))
                .collect()
        };

        ExplainNode { entry, children }
    }

    /// Write the tree with each level indented by two spaces.
    pub fn write_indented(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.entry.to_string());
        out.push('\n');
        for child in &self.children {
            child.write_indented(depth + 1, out);
        }
    }
}

/// Render the DAG as an indented tree starting at the root.
///
/// Nodes with multiple consumers are printed once per consumer.
pub fn tree_string(dag: &RelAlgDag, verbose: bool) -> String {
    let explained = ExplainedDag::new(verbose, dag);
    let mut out = String::new();
    if let Some(base) = &explained.base {
        base.write_indented(0, &mut out);
    }
    out
}

use std::fmt;
use std::sync::Arc;

use crate::logical::dag::RelAlgDag;
use crate::types::SqlType;

/// A scalar subquery. The nested plan is built and optimized on its own and
/// shared with the subquery list of the top level DAG.
#[derive(Debug, Clone)]
pub struct RexSubQuery {
    pub dag: Arc<RelAlgDag>,
    pub ty: Option<SqlType>,
}

impl PartialEq for RexSubQuery {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.dag, &other.dag) && self.ty == other.ty
    }
}

impl fmt::Display for RexSubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dag.root() {
            Some(root) => write!(f, "SUBQUERY({})", self.dag.node(root).id),
            None => write!(f, "SUBQUERY(empty)"),
        }
    }
}

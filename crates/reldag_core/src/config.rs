use serde::{Deserialize, Serialize};

/// Options controlling a DAG build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Insert a compacting projection in front of window function projects
    /// so their inputs arrive in a single buffer.
    pub cluster_mode: bool,
    /// Accept `LogicalUnion` nodes. Only UNION ALL is supported either way.
    pub enable_union: bool,
    /// Check the finished DAG for dangling references.
    pub validate_dag: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            cluster_mode: false,
            enable_union: true,
            validate_dag: true,
        }
    }
}

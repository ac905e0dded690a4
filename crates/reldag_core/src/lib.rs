pub mod binder;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod deserialize;
pub mod explain;
pub mod logical;
pub mod optimizer;
pub mod rex;
pub mod types;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use builder::RelAlgDagBuilder;
pub use catalog::{Catalog, MaterializedTableRegistry, MemoryCatalog};
pub use config::BuildConfig;
pub use explain::tree_string;
pub use logical::dag::{NodeId, RelAlgDag};

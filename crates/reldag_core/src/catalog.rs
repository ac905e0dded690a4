//! Table metadata lookups used while deserializing scans and modifies.

use std::collections::HashMap;
use std::sync::Arc;

use reldag_error::{Result, internal};
use serde::{Deserialize, Serialize};

use crate::types::SqlType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: i64,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub is_view: bool,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Resolves table names referenced by the plan.
pub trait Catalog: Send + Sync {
    fn table(&self, name: &str) -> Option<Arc<TableDescriptor>>;
}

/// Catalog backed by a list of table descriptors.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MemoryCatalog {
    tables: Vec<Arc<TableDescriptor>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.insert(table);
        self
    }

    /// Insert a table, replacing any existing table with the same name.
    pub fn insert(&mut self, table: TableDescriptor) {
        self.tables.retain(|t| t.name != table.name);
        self.tables.push(Arc::new(table));
    }
}

impl Catalog for MemoryCatalog {
    fn table(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        self.tables.iter().find(|t| t.name == name).cloned()
    }
}

/// Data registered for a materialized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTable {
    pub id: i64,
    pub num_rows: usize,
}

/// Table descriptor for a scan over a materialized intermediate result.
///
/// Column metadata comes from the plan itself, the registry only provides
/// the data handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTableDescriptor {
    pub id: i64,
    pub columns: Vec<SqlType>,
    pub data: Arc<MaterializedTable>,
}

/// Materialized tables addressed by integer table id.
#[derive(Debug, Default, Clone)]
pub struct MaterializedTableRegistry {
    tables: HashMap<i64, Arc<MaterializedTable>>,
}

impl MaterializedTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: MaterializedTable) {
        self.tables.insert(table.id, Arc::new(table));
    }

    pub fn get(&self, id: i64) -> Result<Arc<MaterializedTable>> {
        self.tables
            .get(&id)
            .cloned()
            .ok_or_else(|| internal!("Missing materialized table with id {id}"))
    }
}

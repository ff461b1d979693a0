//! Storage-level databases

use crate::data_table::DataTable;
use parking_lot::RwLock;
use std::sync::Arc;
use tilestore_core::{Error, Oid, Result};

/// A named collection of tables
#[derive(Debug)]
pub struct Database {
    oid: Oid,
    name: String,
    tables: RwLock<Vec<Arc<DataTable>>>,
}

impl Database {
    /// Create an empty database
    pub fn new(oid: Oid, name: impl Into<String>) -> Self {
        Database {
            oid,
            name: name.into(),
            tables: RwLock::new(Vec::new()),
        }
    }

    /// Database oid
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a table; oids and names are unique within a database
    pub fn add_table(&self, table: Arc<DataTable>) -> Result<()> {
        let mut tables = self.tables.write();
        if tables
            .iter()
            .any(|t| t.oid() == table.oid() || t.name() == table.name())
        {
            return Err(Error::InvalidOperation(format!(
                "table {} ({}) already exists in database {}",
                table.name(),
                table.oid(),
                self.name
            )));
        }
        tables.push(table);
        Ok(())
    }

    /// Remove a table by oid
    pub fn drop_table(&self, oid: Oid) -> Option<Arc<DataTable>> {
        let mut tables = self.tables.write();
        let position = tables.iter().position(|t| t.oid() == oid)?;
        Some(tables.remove(position))
    }

    /// Table at `offset`
    pub fn table(&self, offset: usize) -> Option<Arc<DataTable>> {
        self.tables.read().get(offset).cloned()
    }

    /// Table with `oid`
    pub fn table_with_oid(&self, oid: Oid) -> Option<Arc<DataTable>> {
        self.tables.read().iter().find(|t| t.oid() == oid).cloned()
    }

    /// Table called `name`
    pub fn table_with_name(&self, name: &str) -> Option<Arc<DataTable>> {
        self.tables.read().iter().find(|t| t.name() == name).cloned()
    }

    /// Number of tables
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Snapshot of the table list
    pub fn tables(&self) -> Vec<Arc<DataTable>> {
        self.tables.read().clone()
    }
}

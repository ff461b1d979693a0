//! Storage manager: the root of all storage-level objects
//!
//! Holds the databases and the tile-group registry. Handles to it are
//! passed explicitly to the catalog, the transaction manager and the
//! checkpoint manager.

use crate::data_table::DataTable;
use crate::database::Database;
use crate::registry::TileGroupRegistry;
use crate::tile_group::TileGroup;
use parking_lot::RwLock;
use std::sync::Arc;
use tilestore_core::{Error, ItemPointer, Oid, Result};
use tracing::debug;

/// Databases plus the tile-group registry
#[derive(Debug, Default)]
pub struct StorageManager {
    databases: RwLock<Vec<Arc<Database>>>,
    registry: Arc<TileGroupRegistry>,
}

impl StorageManager {
    /// Create an empty storage manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared tile-group registry
    pub fn registry(&self) -> &Arc<TileGroupRegistry> {
        &self.registry
    }

    /// Add a database; oids and names must be unique
    pub fn add_database(&self, database: Arc<Database>) -> Result<()> {
        let mut databases = self.databases.write();
        if databases
            .iter()
            .any(|d| d.oid() == database.oid() || d.name() == database.name())
        {
            return Err(Error::InvalidOperation(format!(
                "database {} ({}) already exists",
                database.name(),
                database.oid()
            )));
        }
        debug!(database = database.name(), oid = database.oid(), "Added database");
        databases.push(database);
        Ok(())
    }

    /// Remove a database and unregister the tile groups of its tables
    pub fn drop_database(&self, oid: Oid) -> Option<Arc<Database>> {
        let database = {
            let mut databases = self.databases.write();
            let position = databases.iter().position(|d| d.oid() == oid)?;
            databases.remove(position)
        };
        for table in database.tables() {
            table.drop_tile_groups();
        }
        Some(database)
    }

    /// Database with `oid`
    pub fn database_with_oid(&self, oid: Oid) -> Option<Arc<Database>> {
        self.databases.read().iter().find(|d| d.oid() == oid).cloned()
    }

    /// Database at `offset`
    pub fn database(&self, offset: usize) -> Option<Arc<Database>> {
        self.databases.read().get(offset).cloned()
    }

    /// Whether a database with `oid` exists
    pub fn has_database(&self, oid: Oid) -> bool {
        self.database_with_oid(oid).is_some()
    }

    /// Number of databases
    pub fn database_count(&self) -> usize {
        self.databases.read().len()
    }

    /// Snapshot of the database list
    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.databases.read().clone()
    }

    /// Table `table_oid` of database `database_oid`
    pub fn table_with_oid(&self, database_oid: Oid, table_oid: Oid) -> Result<Arc<DataTable>> {
        self.database_with_oid(database_oid)
            .ok_or_else(|| Error::NotFound(format!("database {}", database_oid)))?
            .table_with_oid(table_oid)
            .ok_or_else(|| {
                Error::NotFound(format!("table {} in database {}", table_oid, database_oid))
            })
    }

    /// Registered tile group with `id`
    pub fn tile_group(&self, id: Oid) -> Option<Arc<TileGroup>> {
        self.registry.get(id)
    }

    /// Tile group holding `location`
    pub fn tile_group_of(&self, location: ItemPointer) -> Result<Arc<TileGroup>> {
        self.registry
            .get(location.block)
            .ok_or_else(|| Error::NotFound(format!("tile group for {}", location)))
    }

    /// Move the tile-group id allocator past `id`
    pub fn ensure_tile_group_id_above(&self, id: Oid) {
        self.registry.ensure_id_above(id);
    }

    /// Id the next new tile group will get
    pub fn next_tile_group_id(&self) -> Oid {
        self.registry.peek_next_id()
    }
}

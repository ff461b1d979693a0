//! The assembled engine

use crate::error::Result;
use std::sync::Arc;
use tilestore_catalog::{Catalog, Settings};
use tilestore_concurrency::{TransactionContext, TransactionManager};
use tilestore_core::{Error, ItemPointer, Value};
use tilestore_durability::{CheckpointConfig, CheckpointManager, RecoveryOutcome};
use tilestore_storage::{DataTable, StorageManager};
use tracing::info;

/// Storage, transactions, catalog and checkpoints wired together
///
/// # Example
///
/// ```text
/// let engine = Engine::open(CheckpointConfig::new("/var/lib/tilestore"), Settings::default())?;
/// engine.checkpoints().start_checkpointing()?;
/// let mut txn = engine.txn_manager().begin_transaction();
/// let table = engine.table("shop", "items", &txn)?;
/// engine.insert(&mut txn, &table, &values)?;
/// engine.txn_manager().commit_transaction(&mut txn)?;
/// ```
#[derive(Debug)]
pub struct Engine {
    storage: Arc<StorageManager>,
    txn_manager: Arc<TransactionManager>,
    catalog: Arc<Catalog>,
    checkpoints: CheckpointManager,
    recovery: RecoveryOutcome,
}

impl Engine {
    /// Bootstrap an engine and restore the newest checkpoint under
    /// `config.checkpoint_dir`, if there is one.
    ///
    /// The checkpoint thread is not started.
    pub fn open(config: CheckpointConfig, settings: Settings) -> Result<Self> {
        let storage = Arc::new(StorageManager::new());
        let txn_manager = Arc::new(TransactionManager::new(Arc::clone(&storage)));
        let catalog = Arc::new(Catalog::new(Arc::clone(&storage), settings));
        catalog.bootstrap()?;
        let checkpoints = CheckpointManager::new(config, Arc::clone(&catalog), Arc::clone(&txn_manager))?;
        let recovery = checkpoints.do_checkpoint_recovery()?;
        info!(
            root = %checkpoints.config().checkpoint_dir.display(),
            recovered = recovery.is_recovered(),
            "Engine opened"
        );
        Ok(Engine {
            storage,
            txn_manager,
            catalog,
            checkpoints,
            recovery,
        })
    }

    /// Storage manager
    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Transaction manager
    pub fn txn_manager(&self) -> &Arc<TransactionManager> {
        &self.txn_manager
    }

    /// Checkpoint manager
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// What recovery found when the engine opened
    pub fn recovery_outcome(&self) -> &RecoveryOutcome {
        &self.recovery
    }

    /// Storage table `database`.`table` as of `txn`
    pub fn table(&self, database: &str, table: &str, txn: &TransactionContext) -> Result<Arc<DataTable>> {
        let database = self.catalog.database_with_name(database, txn)?;
        let entry = self.catalog.table_with_name(database.oid, table, txn)?;
        Ok(self.catalog.storage_table(database.oid, entry.oid)?)
    }

    /// Insert a tuple as an uncommitted write of `txn`
    ///
    /// The slot reserves its unique keys from the moment it is filled. If
    /// `txn` cannot claim it, the reservation is dropped.
    pub fn insert(&self, txn: &mut TransactionContext, table: &DataTable, values: &[Value]) -> Result<ItemPointer> {
        let location = table.insert_tuple(values)?;
        if let Err(e) = self.txn_manager.perform_insert(txn, location) {
            table.release_tuple(location);
            return Err(e.into());
        }
        Ok(location)
    }

    /// Delete the version at `location` as a write of `txn`
    pub fn delete(&self, txn: &mut TransactionContext, table: &DataTable, location: ItemPointer) -> Result<()> {
        if table.tile_group_by_id(location.block).is_none() {
            return Err(Error::NotFound(format!("{} in table {}", location, table.name())).into());
        }
        self.txn_manager.perform_delete(txn, location)?;
        Ok(())
    }

    /// Every version of `table` visible to `txn`, in storage order
    pub fn scan(&self, txn: &TransactionContext, table: &DataTable) -> Result<Vec<(ItemPointer, Vec<Value>)>> {
        let mut rows = Vec::new();
        for group in table.tile_groups() {
            for slot in 0..group.allocated_slots() {
                let location = ItemPointer::new(group.id(), slot);
                if !self.txn_manager.is_visible(txn, location)? {
                    continue;
                }
                if let Some(values) = group.tuple(slot) {
                    rows.push((location, values));
                }
            }
        }
        Ok(rows)
    }

    /// Number of versions of `table` visible to `txn`
    pub fn count(&self, txn: &TransactionContext, table: &DataTable) -> Result<usize> {
        Ok(self.scan(txn, table)?.len())
    }
}

//! One checkpoint pass
//!
//! Every table is written at the read id of a single transaction, so all
//! files of an epoch describe the same snapshot. Writers keep running; old
//! versions stay in the tile groups until nothing can see them.

use crate::catalog_file::write_catalog;
use crate::epoch::{table_file_name, EpochDirectory, CATALOG_FILE_NAME};
use crate::error::CheckpointError;
use crate::table_file::write_table;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tilestore_catalog::{Catalog, DatabaseDescriptor};
use tilestore_concurrency::{TransactionContext, TransactionManager};
use tilestore_core::{CommitId, EpochId, CATALOG_DATABASE_NAME, CATALOG_DATABASE_OID};
use tilestore_storage::DataTable;
use tracing::{debug, info};

/// Summary of a completed checkpoint pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Epoch directory the pass was promoted to
    pub epoch: EpochId,
    /// Commit id the tables were read at
    pub snapshot_cid: CommitId,
    /// Tables written, system tables included
    pub tables: usize,
    /// Tuples written
    pub tuples: u64,
    /// Wall time of the pass
    pub duration: Duration,
}

/// Runs checkpoint passes, one at a time
#[derive(Debug)]
pub(crate) struct Checkpointer {
    pub(crate) epochs: EpochDirectory,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) txn_manager: Arc<TransactionManager>,
    pass_lock: Mutex<()>,
}

#[derive(Default)]
struct Written {
    tables: usize,
    tuples: u64,
}

impl Checkpointer {
    pub(crate) fn new(
        epochs: EpochDirectory,
        catalog: Arc<Catalog>,
        txn_manager: Arc<TransactionManager>,
    ) -> Self {
        Checkpointer {
            epochs,
            catalog,
            txn_manager,
            pass_lock: Mutex::new(()),
        }
    }

    /// Lock held for the whole of a pass or a recovery
    pub(crate) fn exclusive(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.pass_lock.lock()
    }

    /// Stage, write, promote and prune one checkpoint
    pub(crate) fn run_pass(&self) -> Result<CheckpointInfo, CheckpointError> {
        let _pass = self.exclusive();
        let start = Instant::now();
        let staging = self.epochs.begin_staging()?;

        let mut txn = self.txn_manager.begin_transaction();
        let epoch = txn.epoch_id();
        let snapshot_cid = txn.read_id();
        info!(target: "tilestore::checkpoint", epoch, snapshot_cid, "Checkpoint started");

        let written = self.write_snapshot(&staging, &txn);
        let ended = self.txn_manager.end_transaction(&mut txn);
        let written = written?;
        ended?;

        self.epochs.promote(epoch)?;
        let pruned = self.epochs.prune(epoch)?;

        let info = CheckpointInfo {
            epoch,
            snapshot_cid,
            tables: written.tables,
            tuples: written.tuples,
            duration: start.elapsed(),
        };
        info!(
            target: "tilestore::checkpoint",
            epoch,
            tables = info.tables,
            tuples = info.tuples,
            pruned,
            duration_ms = info.duration.as_millis() as u64,
            "Checkpoint finished"
        );
        Ok(info)
    }

    fn write_snapshot(&self, staging: &Path, txn: &TransactionContext) -> Result<Written, CheckpointError> {
        let snapshot = txn.read_id();
        let databases = self
            .catalog
            .database_objects(txn)
            .into_iter()
            .filter(|d| d.oid != CATALOG_DATABASE_OID)
            .map(|d| self.catalog.describe_database(d.oid, txn))
            .collect::<tilestore_core::Result<Vec<DatabaseDescriptor>>>()?;
        let plan = self.plan_files(&databases)?;

        write_catalog(&databases, &EpochDirectory::catalog_file(staging))?;
        debug!(target: "tilestore::checkpoint", databases = databases.len(), "Wrote catalog objects");

        let mut written = Written::default();
        for (table, file_name) in &plan {
            written.tuples += write_table(table, snapshot, &staging.join(file_name))?;
            written.tables += 1;
        }
        Ok(written)
    }

    /// Storage and file name of every table of the pass, user tables
    /// first. Two tables sharing a file name fail the pass before anything
    /// is written.
    fn plan_files(&self, databases: &[DatabaseDescriptor]) -> Result<Vec<(Arc<DataTable>, String)>, CheckpointError> {
        let mut plan = Vec::new();
        for database in databases {
            for descriptor in &database.tables {
                let table = self
                    .catalog
                    .storage_table(database.oid, descriptor.oid)
                    .map_err(|e| {
                        CheckpointError::Catalog(format!(
                            "table {}.{} has no storage: {}",
                            database.name, descriptor.name, e
                        ))
                    })?;
                plan.push((
                    format!("{}.{}", database.name, descriptor.name),
                    table,
                    table_file_name(&database.name, &descriptor.name),
                ));
            }
        }
        for system in self.catalog.checkpoint_system_tables() {
            let table = self.catalog.system_table(system)?;
            plan.push((
                format!("{}.{}", CATALOG_DATABASE_NAME, system.name()),
                table,
                table_file_name(CATALOG_DATABASE_NAME, system.name()),
            ));
        }

        {
            let mut owners: HashMap<&str, &str> = HashMap::new();
            owners.insert(CATALOG_FILE_NAME, "catalog objects");
            for (qualified, _, file_name) in &plan {
                if let Some(previous) = owners.insert(file_name.as_str(), qualified.as_str()) {
                    return Err(CheckpointError::Catalog(format!(
                        "{} and {} both map to checkpoint file {}",
                        previous, qualified, file_name
                    )));
                }
            }
        }
        Ok(plan
            .into_iter()
            .map(|(_, table, file_name)| (table, file_name))
            .collect())
    }
}

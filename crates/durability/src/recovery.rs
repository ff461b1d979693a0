//! Crash recovery from the newest checkpoint
//!
//! Recovery runs once at startup on a freshly bootstrapped catalog, before
//! any other transaction begins. It either applies a whole epoch or fails;
//! a partly restored store is never reported as recovered.
//!
//! ## Sequence
//!
//! 1. Find the newest promoted epoch. None means a cold start.
//! 2. Move the commit-id counter past the epoch and begin one transaction.
//! 3. Restore databases, tables and indexes from `catalog.cpp`.
//! 4. Replay every user table, then the checkpointed system tables.
//! 5. Commit. Any failure aborts the transaction instead.

use crate::catalog_file::read_catalog;
use crate::epoch::EpochDirectory;
use crate::error::RecoveryError;
use crate::table_file::replay_table;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tilestore_catalog::Catalog;
use tilestore_concurrency::{TransactionContext, TransactionManager};
use tilestore_core::{EpochId, CATALOG_DATABASE_NAME};
use tilestore_storage::DataTable;
use tracing::{error, info, warn};

/// Progress of a recovery
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecoveryPhase {
    /// Not started, or no checkpoint was found
    #[default]
    Idle,
    /// Reading catalog objects
    CatalogRestoring,
    /// Replaying one table
    TableRestoring {
        /// Database name
        database: String,
        /// Table name
        table: String,
    },
    /// Every table replayed and the transaction committed
    Done,
    /// Recovery failed and its transaction was aborted
    Failed,
}

/// Result of a recovery that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No promoted epoch exists; the engine starts empty
    NoCheckpoint,
    /// The newest epoch was applied
    Recovered {
        /// Epoch that was read
        epoch: EpochId,
        /// Tables replayed, system tables included
        tables: usize,
        /// Tuples replayed
        tuples: u64,
    },
}

impl RecoveryOutcome {
    /// True if a checkpoint was found and fully applied
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered { .. })
    }
}

pub(crate) struct Recovery<'a> {
    pub(crate) epochs: &'a EpochDirectory,
    pub(crate) catalog: &'a Catalog,
    pub(crate) txn_manager: &'a TransactionManager,
    pub(crate) phase: &'a Mutex<RecoveryPhase>,
}

impl Recovery<'_> {
    fn set_phase(&self, phase: RecoveryPhase) {
        *self.phase.lock() = phase;
    }

    pub(crate) fn run(&self) -> Result<RecoveryOutcome, RecoveryError> {
        let start = Instant::now();
        let newest = self
            .epochs
            .newest_epoch()
            .map_err(|e| RecoveryError::io(self.epochs.root(), e))?;
        let epoch = match newest {
            Some(epoch) => epoch,
            None => {
                info!(
                    target: "tilestore::recovery",
                    root = %self.epochs.root().display(),
                    "No checkpoint found, starting empty"
                );
                return Ok(RecoveryOutcome::NoCheckpoint);
            }
        };

        let dir = self.epochs.epoch_dir(epoch);
        info!(target: "tilestore::recovery", epoch, path = %dir.display(), "Recovering from checkpoint");
        self.txn_manager.advance_past(epoch);
        let mut txn = self.txn_manager.begin_transaction();

        let restored = self
            .restore(&dir, &mut txn)
            .and_then(|counts| {
                self.txn_manager.commit_transaction(&mut txn)?;
                Ok(counts)
            });
        match restored {
            Ok((tables, tuples)) => {
                self.set_phase(RecoveryPhase::Done);
                info!(
                    target: "tilestore::recovery",
                    epoch,
                    tables,
                    tuples,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Recovery finished"
                );
                Ok(RecoveryOutcome::Recovered {
                    epoch,
                    tables,
                    tuples,
                })
            }
            Err(err) => {
                if txn.is_active() {
                    if let Err(abort) = self.txn_manager.abort_transaction(&mut txn, err.to_string()) {
                        warn!(target: "tilestore::recovery", error = %abort, "Abort of recovery transaction failed");
                    }
                }
                self.set_phase(RecoveryPhase::Failed);
                error!(target: "tilestore::recovery", epoch, error = %err, kind = ?err.kind(), "Recovery failed");
                Err(err)
            }
        }
    }

    fn restore(&self, dir: &Path, txn: &mut TransactionContext) -> Result<(usize, u64), RecoveryError> {
        self.set_phase(RecoveryPhase::CatalogRestoring);
        let databases = read_catalog(&EpochDirectory::catalog_file(dir))?;

        let mut targets: Vec<(String, Arc<DataTable>)> = Vec::new();
        for descriptor in &databases {
            self.catalog
                .restore_database(descriptor)
                .map_err(RecoveryError::catalog)?;
            for table in &descriptor.tables {
                let storage = self
                    .catalog
                    .storage_table(descriptor.oid, table.oid)
                    .map_err(RecoveryError::catalog)?;
                targets.push((descriptor.name.clone(), storage));
            }
        }
        for system in self.catalog.checkpoint_system_tables() {
            let storage = self
                .catalog
                .system_table(system)
                .map_err(RecoveryError::catalog)?;
            targets.push((CATALOG_DATABASE_NAME.to_string(), storage));
        }

        // Default tile groups of fresh tables may hold ids the files reuse
        for (_, table) in &targets {
            table.drop_tile_groups();
        }

        let mut tuples = 0;
        for (database, table) in &targets {
            self.set_phase(RecoveryPhase::TableRestoring {
                database: database.clone(),
                table: table.name().to_string(),
            });
            let path = EpochDirectory::table_file(dir, database, table.name());
            tuples += replay_table(table, self.txn_manager, txn, &path)?;
        }
        Ok((targets.len(), tuples))
    }
}

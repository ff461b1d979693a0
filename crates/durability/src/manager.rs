//! Entry point of the checkpoint subsystem
//!
//! ```ignore
//! let manager = CheckpointManager::new(config, catalog, txn_manager)?;
//! if manager.do_checkpoint_recovery()?.is_recovered() {
//!     // tables are back as of the newest epoch
//! }
//! manager.start_checkpointing()?;
//! // ...
//! manager.stop_checkpointing();
//! ```

use crate::checkpointer::{CheckpointInfo, Checkpointer};
use crate::config::CheckpointConfig;
use crate::driver::{Driver, DriverState};
use crate::epoch::EpochDirectory;
use crate::error::{CheckpointError, RecoveryError};
use crate::recovery::{Recovery, RecoveryOutcome, RecoveryPhase};
use parking_lot::Mutex;
use std::sync::Arc;
use tilestore_catalog::Catalog;
use tilestore_concurrency::TransactionManager;

/// Periodic checkpointing and startup recovery for one engine
#[derive(Debug)]
pub struct CheckpointManager {
    config: CheckpointConfig,
    checkpointer: Arc<Checkpointer>,
    driver: Driver,
    phase: Mutex<RecoveryPhase>,
}

impl CheckpointManager {
    /// Create a manager. Nothing touches the disk until a pass or a
    /// recovery runs.
    pub fn new(
        config: CheckpointConfig,
        catalog: Arc<Catalog>,
        txn_manager: Arc<TransactionManager>,
    ) -> Result<Self, CheckpointError> {
        config.validate()?;
        let epochs = EpochDirectory::new(config.checkpoint_dir.clone());
        Ok(CheckpointManager {
            config,
            checkpointer: Arc::new(Checkpointer::new(epochs, catalog, txn_manager)),
            driver: Driver::default(),
            phase: Mutex::new(RecoveryPhase::Idle),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Checkpoint root and its epoch directories
    pub fn epochs(&self) -> &EpochDirectory {
        &self.checkpointer.epochs
    }

    /// Start the background checkpoint thread
    pub fn start_checkpointing(&self) -> Result<(), CheckpointError> {
        self.driver.start(
            Arc::clone(&self.checkpointer),
            self.config.checkpoint_interval,
            self.config.tick(),
        )
    }

    /// Stop the background thread and wait for it. A pass in flight
    /// completes first. Does nothing when already stopped.
    pub fn stop_checkpointing(&self) {
        self.driver.stop();
    }

    /// State of the background thread
    pub fn driver_state(&self) -> DriverState {
        self.driver.state()
    }

    /// Run one checkpoint pass on the calling thread
    pub fn perform_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.checkpointer.run_pass()
    }

    /// Restore the newest checkpoint, if there is one
    ///
    /// Must run before any other transaction begins. An error means the
    /// store is not in a consistent state and startup must not continue.
    pub fn do_checkpoint_recovery(&self) -> Result<RecoveryOutcome, RecoveryError> {
        let _exclusive = self.checkpointer.exclusive();
        *self.phase.lock() = RecoveryPhase::Idle;
        Recovery {
            epochs: &self.checkpointer.epochs,
            catalog: &self.checkpointer.catalog,
            txn_manager: &self.checkpointer.txn_manager,
            phase: &self.phase,
        }
        .run()
    }

    /// Progress of the last recovery
    pub fn recovery_phase(&self) -> RecoveryPhase {
        self.phase.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::CATALOG_FILE_NAME;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tilestore_catalog::Settings;
    use tilestore_storage::StorageManager;

    fn manager(dir: &TempDir, interval: u32) -> CheckpointManager {
        let storage = Arc::new(StorageManager::new());
        let catalog = Arc::new(Catalog::new(Arc::clone(&storage), Settings::default()));
        catalog.bootstrap().unwrap();
        let txn_manager = Arc::new(TransactionManager::new(storage));
        let config = CheckpointConfig::new(dir.path().join("cp"))
            .with_interval(interval)
            .with_tick(Duration::from_millis(5));
        CheckpointManager::new(config, catalog, txn_manager).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let storage = Arc::new(StorageManager::new());
        let catalog = Arc::new(Catalog::new(Arc::clone(&storage), Settings::default()));
        let txn_manager = Arc::new(TransactionManager::new(storage));
        let config = CheckpointConfig::default().with_interval(0);
        assert!(matches!(
            CheckpointManager::new(config, catalog, txn_manager),
            Err(CheckpointError::Config(_))
        ));
    }

    #[test]
    fn test_start_twice_rejected_and_stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 1_000);
        assert_eq!(manager.driver_state(), DriverState::Stopped);
        manager.stop_checkpointing();

        manager.start_checkpointing().unwrap();
        assert_eq!(manager.driver_state(), DriverState::Running);
        assert!(matches!(
            manager.start_checkpointing(),
            Err(CheckpointError::AlreadyRunning)
        ));

        manager.stop_checkpointing();
        assert_eq!(manager.driver_state(), DriverState::Stopped);
        manager.stop_checkpointing();

        manager.start_checkpointing().unwrap();
        manager.stop_checkpointing();
    }

    #[test]
    fn test_stop_lets_a_pass_in_flight_finish() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 1);
        let pass = manager.checkpointer.exclusive();
        manager.start_checkpointing().unwrap();
        // The first tick fires and its pass waits on the lock held here
        std::thread::sleep(Duration::from_millis(200));

        std::thread::scope(|scope| {
            let stopping = scope.spawn(|| manager.stop_checkpointing());
            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(manager.driver_state(), DriverState::Stopped);
            assert!(!stopping.is_finished());
            assert!(manager.epochs().newest_epoch().unwrap().is_none());
            drop(pass);
            stopping.join().unwrap();
        });

        let epoch = manager.epochs().newest_epoch().unwrap().unwrap();
        assert!(manager.epochs().epoch_dir(epoch).join(CATALOG_FILE_NAME).is_file());
        assert!(!manager.epochs().staging_dir().exists());
        assert_eq!(manager.epochs().list_epochs().unwrap(), vec![epoch]);
    }

    #[test]
    fn test_driver_promotes_epochs() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 2);
        manager.start_checkpointing().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while manager.epochs().newest_epoch().unwrap().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        manager.stop_checkpointing();

        let epochs = manager.epochs().list_epochs().unwrap();
        assert_eq!(epochs.len(), 1);
        assert!(!manager.epochs().staging_dir().exists());
    }

    #[test]
    fn test_recovery_without_checkpoint() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 1);
        let outcome = manager.do_checkpoint_recovery().unwrap();
        assert_eq!(outcome, RecoveryOutcome::NoCheckpoint);
        assert!(!outcome.is_recovered());
        assert_eq!(manager.recovery_phase(), RecoveryPhase::Idle);
    }

    #[test]
    fn test_epochs_increase_across_passes() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 1);
        let first = manager.perform_checkpoint().unwrap();
        let second = manager.perform_checkpoint().unwrap();
        assert!(second.epoch > first.epoch);
        assert_eq!(first.epoch, first.snapshot_cid);
        assert_eq!(manager.epochs().list_epochs().unwrap(), vec![second.epoch]);
    }
}

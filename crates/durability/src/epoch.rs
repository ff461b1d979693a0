//! Epoch directories under the checkpoint root
//!
//! ```text
//! <root>/working/                  staging area, never read by recovery
//! <root>/working/catalog.cpp       catalog objects
//! <root>/working/<db>_<table>.cpp  one file per table
//! <root>/<epoch>/...               promoted checkpoint, name is the decimal epoch
//! ```
//!
//! Renaming `working` to `<epoch>` is the commit point of a checkpoint.

use crate::error::CheckpointError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tilestore_catalog::qualified_table_name;
use tilestore_core::EpochId;
use tracing::{debug, warn};

/// Name of the staging directory
pub const STAGING_DIR_NAME: &str = "working";

/// Name of the catalog-object file inside an epoch directory
pub const CATALOG_FILE_NAME: &str = "catalog.cpp";

/// Extension of checkpoint files
pub const CHECKPOINT_FILE_EXTENSION: &str = "cpp";

/// Parse a directory name as an epoch
///
/// Only non-empty, all-digit names that fit a `u64` count. Epoch 0 is
/// never produced by a checkpoint and is ignored.
pub fn parse_epoch(name: &str) -> Option<EpochId> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<EpochId>().ok().filter(|epoch| *epoch != 0)
}

/// Name of the data file for `table` in `database`
pub fn table_file_name(database: &str, table: &str) -> String {
    format!(
        "{}.{}",
        qualified_table_name(database, table),
        CHECKPOINT_FILE_EXTENSION
    )
}

/// fsync a directory so renames and creations inside it are durable
pub(crate) fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

/// The checkpoint root and the epoch directories below it
#[derive(Debug, Clone)]
pub struct EpochDirectory {
    root: PathBuf,
}

impl EpochDirectory {
    /// Directory manager rooted at `root`. Nothing is created until
    /// [`EpochDirectory::begin_staging`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        EpochDirectory { root: root.into() }
    }

    /// Checkpoint root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Path of the directory for `epoch`
    pub fn epoch_dir(&self, epoch: EpochId) -> PathBuf {
        self.root.join(epoch.to_string())
    }

    /// Path of the catalog file inside `dir`
    pub fn catalog_file(dir: &Path) -> PathBuf {
        dir.join(CATALOG_FILE_NAME)
    }

    /// Path of the data file for `database`.`table` inside `dir`
    pub fn table_file(dir: &Path, database: &str, table: &str) -> PathBuf {
        dir.join(table_file_name(database, table))
    }

    /// Create an empty staging directory, removing a stale one first
    pub fn begin_staging(&self) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.root).map_err(|e| CheckpointError::io(&self.root, e))?;
        let staging = self.staging_dir();
        if staging.exists() {
            warn!(target: "tilestore::checkpoint", path = %staging.display(), "Removing stale staging directory");
            fs::remove_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        }
        fs::create_dir(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        Ok(staging)
    }

    /// Atomically rename the staging directory to `<epoch>`
    ///
    /// Fails if the epoch directory already exists.
    pub fn promote(&self, epoch: EpochId) -> Result<PathBuf, CheckpointError> {
        let staging = self.staging_dir();
        let target = self.epoch_dir(epoch);
        sync_dir(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        if target.exists() {
            return Err(CheckpointError::io(
                &target,
                io::Error::new(io::ErrorKind::AlreadyExists, "epoch directory already exists"),
            ));
        }
        fs::rename(&staging, &target).map_err(|e| CheckpointError::io(&target, e))?;
        sync_dir(&self.root).map_err(|e| CheckpointError::io(&self.root, e))?;
        debug!(target: "tilestore::checkpoint", epoch, "Promoted staging directory");
        Ok(target)
    }

    /// Remove every epoch directory except `keep`. Returns how many were
    /// removed.
    pub fn prune(&self, keep: EpochId) -> Result<usize, CheckpointError> {
        let epochs = self
            .list_epochs()
            .map_err(|e| CheckpointError::io(&self.root, e))?;
        let mut removed = 0;
        for epoch in epochs.into_iter().filter(|e| *e != keep) {
            let dir = self.epoch_dir(epoch);
            fs::remove_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
            debug!(target: "tilestore::checkpoint", epoch, "Pruned epoch directory");
            removed += 1;
        }
        if removed > 0 {
            sync_dir(&self.root).map_err(|e| CheckpointError::io(&self.root, e))?;
        }
        Ok(removed)
    }

    /// Promoted epochs in ascending order. A missing root has none.
    pub fn list_epochs(&self) -> io::Result<Vec<EpochId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut epochs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(epoch) = name.to_str().and_then(parse_epoch) {
                epochs.push(epoch);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }

    /// The newest promoted epoch, if any
    pub fn newest_epoch(&self) -> io::Result<Option<EpochId>> {
        Ok(self.list_epochs()?.last().copied())
    }
}

//! Checkpoint and recovery errors
//!
//! A failed checkpoint pass is logged by the driver and retried on the next
//! tick. A failed recovery aborts its transaction and must stop startup.
//! "No checkpoint" is not an error; see [`RecoveryOutcome`].
//!
//! [`RecoveryOutcome`]: crate::recovery::RecoveryOutcome

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;
use tilestore_concurrency::TransactionError;

/// Errors from a checkpoint pass or the checkpoint driver
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// File or directory operation failed
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        /// Path being written, renamed or removed
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Storage lookup failed
    #[error("Storage error: {0}")]
    Core(#[from] tilestore_core::Error),

    /// Catalog and storage disagree about a checkpoint target
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The checkpoint transaction could not be ended
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    /// `start_checkpointing` called while the driver runs
    #[error("Checkpointing is already running")]
    AlreadyRunning,

    /// The driver thread could not be spawned
    #[error("Failed to spawn checkpoint thread: {0}")]
    Spawn(#[source] io::Error),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Coarse classification of recovery failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Open, read or directory scan failed
    Io,
    /// Bytes are truncated or malformed
    Format,
    /// Replay could not be applied (insert, catalog or transaction failure)
    Semantic,
}

/// Errors that make a recovery fail
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// File or directory operation failed
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// A checkpoint file is truncated or malformed
    #[error("Malformed checkpoint file '{}': {source}", path.display())]
    Format {
        /// File being decoded
        path: PathBuf,
        /// Decoding error
        source: tilestore_core::Error,
    },

    /// A tuple or tile group could not be replayed into a table
    #[error("Replay into table {table} failed: {reason}")]
    Insert {
        /// Target table
        table: String,
        /// What went wrong
        reason: String,
    },

    /// Catalog objects could not be restored
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The recovery transaction could not be committed
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl RecoveryError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoveryError::Io { .. } => ErrorKind::Io,
            RecoveryError::Format { .. } => ErrorKind::Format,
            RecoveryError::Insert { .. }
            | RecoveryError::Catalog(_)
            | RecoveryError::Transaction(_) => ErrorKind::Semantic,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RecoveryError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: tilestore_core::Error) -> Self {
        RecoveryError::Format {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn catalog(err: impl ToString) -> Self {
        RecoveryError::Catalog(err.to_string())
    }

    pub(crate) fn insert(table: impl Into<String>, reason: impl ToString) -> Self {
        RecoveryError::Insert {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}

//! Engine-level errors

use tilestore_concurrency::TransactionError;
use tilestore_durability::{CheckpointError, RecoveryError};

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by [`Engine`](crate::Engine)
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Storage or catalog failure
    #[error(transparent)]
    Storage(#[from] tilestore_core::Error),

    /// Transaction failure
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Checkpoint configuration or pass failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Recovery failed; the engine must not start
    #[error("Recovery failed: {0}")]
    Recovery(#[from] RecoveryError),
}

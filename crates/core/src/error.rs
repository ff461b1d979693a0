//! Error types shared by every tilestore layer
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::Oid;
use crate::value::TypeId;
use std::io;
use thiserror::Error;

/// Result type alias for tilestore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the storage engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialized bytes are truncated or malformed
    #[error("Format error: {0}")]
    Format(String),

    /// A value does not match the type its column declares
    #[error("Type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Declared column type
        expected: TypeId,
        /// Type of the offered value
        actual: TypeId,
    },

    /// NOT NULL, CHECK, UNIQUE or PRIMARY KEY violated
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Tile group has no free tuple slot left
    #[error("Tile group {tile_group_id} is full ({capacity} slots)")]
    CapacityExceeded {
        /// Tile group that rejected the insert
        tile_group_id: Oid,
        /// Number of slots in that tile group
        capacity: u32,
    },

    /// Catalog lookup or definition failure
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Object could not be located
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Build a format error from any message
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Build a catalog error from any message
    pub fn catalog(msg: impl Into<String>) -> Self {
        Error::Catalog(msg.into())
    }

    /// True for errors caused by malformed serialized input
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_) | Error::TypeMismatch { .. })
    }
}

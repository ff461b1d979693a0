//! Concurrency layer for tilestore
//!
//! This crate implements timestamp-ordered multi-version concurrency
//! control over the tile-group slot headers:
//! - TransactionContext: snapshot read id plus claimed slots
//! - TransactionManager: begin / commit / abort / end, slot stamping
//! - Reader visibility including own writes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;

pub use manager::TransactionManager;
pub use transaction::{
    ConflictAvoidance, IsolationLevel, Result, TransactionContext, TransactionError,
    TransactionStatus,
};

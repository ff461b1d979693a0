//! Core types for tilestore
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifiers and sentinels: Oid, TxnId, CommitId, EpochId, ItemPointer
//! - Value: typed column values and their wire encoding
//! - Schema: columns, column constraints, multi-column constraints
//! - SerializeOutput / SerializeInput: length-checked binary buffers
//! - Error: error type shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod schema;
pub mod serialize;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use schema::{Column, ColumnConstraint, CompareOp, MultiConstraint, MultiConstraintKind, Schema};
pub use serialize::{SerializeInput, SerializeOutput};
pub use types::{
    CommitId, EpochId, ItemPointer, Oid, TxnId, CATALOG_DATABASE_NAME, CATALOG_DATABASE_OID,
    INITIAL_TXN_ID, INVALID_CID, INVALID_OID, INVALID_TXN_ID, MAX_CID, START_OID,
};
pub use value::{TypeId, Value};

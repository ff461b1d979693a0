//! Tilestore - multi-version, tile-organized storage with consistent checkpoints
//!
//! Tables are stored in fixed-capacity tile groups whose slots carry MVCC
//! headers. A background thread periodically writes every table as of one
//! snapshot into an epoch directory, and startup restores the newest epoch.
//!
//! # Quick Start
//!
//! ```text
//! use tilestore::{CheckpointConfig, Engine, Settings};
//!
//! let engine = Engine::open(CheckpointConfig::new("./data/checkpoints"), Settings::default())?;
//! engine.checkpoints().start_checkpointing()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod error;

pub use engine::Engine;
pub use error::{EngineError, Result};

pub use tilestore_catalog::{Catalog, IndexSpec, Settings, TableOptions};
pub use tilestore_concurrency::{TransactionContext, TransactionManager};
pub use tilestore_core::{Column, ItemPointer, Schema, TypeId, Value};
pub use tilestore_durability::{
    CheckpointConfig, CheckpointInfo, CheckpointManager, DriverState, RecoveryOutcome, RecoveryPhase,
};
pub use tilestore_storage::{DataTable, LayoutType};

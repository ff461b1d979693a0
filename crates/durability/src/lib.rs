//! Checkpointing and crash recovery for tilestore
//!
//! This crate provides:
//! - `EpochDirectory`: staging, promotion and pruning of epoch directories
//! - `is_visible`: the snapshot visibility predicate for tuple slots
//! - `write_table` / `replay_table`: per-table checkpoint files
//! - `write_catalog` / `read_catalog`: the catalog-object file
//! - `CheckpointManager`: the background driver and startup recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog_file;
pub mod checkpointer;
pub mod config;
pub mod driver;
pub mod epoch;
pub mod error;
pub mod manager;
pub mod recovery;
pub mod table_file;
pub mod visibility;

pub use catalog_file::{decode_catalog, encode_catalog, read_catalog, write_catalog};
pub use checkpointer::CheckpointInfo;
pub use config::{CheckpointConfig, ConfigError};
pub use driver::{DriverState, DRIVER_THREAD_NAME};
pub use epoch::{parse_epoch, EpochDirectory, CATALOG_FILE_NAME, STAGING_DIR_NAME};
pub use error::{CheckpointError, ErrorKind, RecoveryError};
pub use manager::CheckpointManager;
pub use recovery::{RecoveryOutcome, RecoveryPhase};
pub use table_file::{replay_table, write_table};
pub use visibility::{is_visible, visible_slots};

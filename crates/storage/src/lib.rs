//! Tile-organized multi-version storage for tilestore
//!
//! This crate implements the physical storage layer:
//! - TileGroup: fixed-capacity slot container with a per-slot MVCC header
//! - Layout: row, column or hybrid mapping of columns onto tiles
//! - DataTable: schema, tile groups, indexes, tuple count
//! - Index: ordered key → locations map over wire-encoded keys
//! - Database / StorageManager: ownership roots and tile-group registry
//!
//! Visibility is not decided here. Slot headers are stamped by the
//! transaction manager and read by whoever evaluates a snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data_table;
pub mod database;
pub mod index;
pub mod layout;
pub mod manager;
pub mod registry;
pub mod tile_group;

pub use data_table::{DataTable, DEFAULT_TUPLES_PER_TILE_GROUP};
pub use database::Database;
pub use index::{Index, IndexConstraintType, IndexMetadata, IndexType};
pub use layout::{Layout, LayoutType};
pub use manager::StorageManager;
pub use registry::TileGroupRegistry;
pub use tile_group::{TileGroup, TileGroupHeader};

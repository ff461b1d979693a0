//! Catalog for tilestore
//!
//! This crate records what exists and since when:
//! - Catalog: databases, tables, indexes, evaluated per snapshot
//! - SystemTable: the fixed set of tables under `pg_catalog`
//! - Descriptors: the storage-level projection written by checkpoints
//! - Settings: engine settings the catalog consults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod entry;
pub mod settings;
pub mod system;

pub use catalog::{qualified_table_name, Catalog, IndexSpec, TableOptions};
pub use entry::{
    DatabaseCatalogEntry, DatabaseDescriptor, IndexCatalogEntry, Lifetime, TableCatalogEntry,
    TableDescriptor,
};
pub use settings::{SettingId, Settings};
pub use system::SystemTable;

//! Catalog entries and checkpoint descriptors
//!
//! Entries carry the commit ids between which they exist so that every
//! lookup can be answered as of a transaction's snapshot. Descriptors are
//! the narrower projection that the checkpoint writes: enough to rebuild
//! storage objects, nothing else.

use tilestore_core::{CommitId, Oid, Schema, MAX_CID};
use tilestore_storage::{IndexMetadata, LayoutType};

/// Lifetime of a catalog entry in commit-id time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    /// Read id of the creating transaction
    pub created_cid: CommitId,
    /// Read id of the dropping transaction, or `MAX_CID`
    pub dropped_cid: CommitId,
}

impl Lifetime {
    pub(crate) fn created_at(cid: CommitId) -> Self {
        Lifetime {
            created_cid: cid,
            dropped_cid: MAX_CID,
        }
    }

    /// Whether the entry exists as of `read_id`
    pub fn visible_at(&self, read_id: CommitId) -> bool {
        self.created_cid <= read_id && read_id < self.dropped_cid
    }

    /// Whether the entry has been dropped at all
    pub fn is_dropped(&self) -> bool {
        self.dropped_cid != MAX_CID
    }
}

/// A database as recorded by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseCatalogEntry {
    /// Database oid
    pub oid: Oid,
    /// Database name
    pub name: String,
    /// When it exists
    pub lifetime: Lifetime,
}

/// A table as recorded by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct TableCatalogEntry {
    /// Table oid
    pub oid: Oid,
    /// Owning database
    pub database_oid: Oid,
    /// Table name
    pub name: String,
    /// Schema including constraints
    pub schema: Schema,
    /// Slots per tile group
    pub tuples_per_tile_group: u32,
    /// Layout of new tile groups
    pub layout_type: LayoutType,
    /// When it exists
    pub lifetime: Lifetime,
}

/// An index as recorded by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCatalogEntry {
    /// Owning database
    pub database_oid: Oid,
    /// Indexed table
    pub table_oid: Oid,
    /// Index definition
    pub metadata: IndexMetadata,
    /// When it exists
    pub lifetime: Lifetime,
}

/// Storage-level projection of a database
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDescriptor {
    /// Database oid
    pub oid: Oid,
    /// Database name
    pub name: String,
    /// Tables in creation order
    pub tables: Vec<TableDescriptor>,
}

/// Storage-level projection of a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// Table oid
    pub oid: Oid,
    /// Table name
    pub name: String,
    /// Schema including constraints
    pub schema: Schema,
    /// Slots per tile group
    pub tuples_per_tile_group: u32,
    /// Layout of new tile groups
    pub layout_type: LayoutType,
    /// Indexes on the table
    pub indexes: Vec<IndexMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_interval() {
        let mut lifetime = Lifetime::created_at(5);
        assert!(!lifetime.visible_at(4));
        assert!(lifetime.visible_at(5));
        assert!(lifetime.visible_at(1_000));
        assert!(!lifetime.is_dropped());
        lifetime.dropped_cid = 9;
        assert!(lifetime.visible_at(8));
        assert!(!lifetime.visible_at(9));
        assert!(lifetime.is_dropped());
    }
}

//! Identifiers and sentinel values
//!
//! Every layer agrees on these: storage stamps them into tile-group
//! headers, the transaction manager hands them out, and the checkpoint
//! files carry them across restarts.

use std::fmt;

/// Object identifier (databases, tables, indexes, tile groups, slots)
pub type Oid = u32;

/// Transaction identifier
pub type TxnId = u64;

/// Logical commit timestamp
pub type CommitId = u64;

/// Checkpoint generation identifier
pub type EpochId = u64;

/// First offset when iterating databases, tables or tile groups
pub const START_OID: Oid = 0;

/// Oid that names nothing
pub const INVALID_OID: Oid = u32::MAX;

/// Oid of the system catalog database
pub const CATALOG_DATABASE_OID: Oid = 1;

/// Name of the system catalog database
pub const CATALOG_DATABASE_NAME: &str = "pg_catalog";

/// Owner of a slot that holds no version (never written or aborted)
pub const INVALID_TXN_ID: TxnId = 0;

/// Owner of a committed slot that no transaction currently holds
pub const INITIAL_TXN_ID: TxnId = 1;

/// Commit id that names nothing
pub const INVALID_CID: CommitId = 0;

/// "Not yet committed" / "never deleted"
pub const MAX_CID: CommitId = u64::MAX;

/// Physical location of one tuple version: (tile group id, slot offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPointer {
    /// Tile group id
    pub block: Oid,
    /// Slot offset inside the tile group
    pub offset: Oid,
}

impl ItemPointer {
    /// Create a location
    pub fn new(block: Oid, offset: Oid) -> Self {
        ItemPointer { block, offset }
    }

    /// Location that points nowhere
    pub fn invalid() -> Self {
        ItemPointer {
            block: INVALID_OID,
            offset: INVALID_OID,
        }
    }

    /// False for the `invalid()` location
    pub fn is_valid(&self) -> bool {
        self.block != INVALID_OID && self.offset != INVALID_OID
    }
}

impl fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block, self.offset)
    }
}

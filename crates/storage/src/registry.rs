//! Tile-group registry
//!
//! Every live tile group is registered here by id so that a bare
//! `ItemPointer` can be resolved without knowing the owning table. The
//! registry also hands out tile-group ids.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = TileGroupRegistry::new();
//! let id = registry.next_id();
//! registry.register(Arc::new(TileGroup::new(id, db, table, 1000, layout)))?;
//!
//! // Recovery restores groups with their original ids, then moves the
//! // allocator past them
//! registry.ensure_id_above(max_restored_id);
//! ```

use crate::tile_group::TileGroup;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tilestore_core::{Error, Oid, Result, START_OID};

/// Registry of tile groups by id
#[derive(Debug)]
pub struct TileGroupRegistry {
    groups: DashMap<Oid, Arc<TileGroup>>,
    next_id: AtomicU32,
}

impl TileGroupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        TileGroupRegistry {
            groups: DashMap::new(),
            next_id: AtomicU32::new(START_OID + 1),
        }
    }

    /// Allocate a fresh tile-group id
    pub fn next_id(&self) -> Oid {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Id the next allocation will return
    pub fn peek_next_id(&self) -> Oid {
        self.next_id.load(Ordering::Acquire)
    }

    /// Ensure future allocations return ids strictly greater than `id`
    pub fn ensure_id_above(&self, id: Oid) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::AcqRel);
    }

    /// Register a tile group; an id already in use is rejected
    pub fn register(&self, group: Arc<TileGroup>) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.groups.entry(group.id()) {
            Entry::Occupied(_) => Err(Error::InvalidOperation(format!(
                "tile group {} is already registered",
                group.id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(group);
                Ok(())
            }
        }
    }

    /// Remove a tile group
    pub fn unregister(&self, id: Oid) -> Option<Arc<TileGroup>> {
        self.groups.remove(&id).map(|(_, group)| group)
    }

    /// Look up a tile group
    pub fn get(&self, id: Oid) -> Option<Arc<TileGroup>> {
        self.groups.get(&id).map(|g| Arc::clone(g.value()))
    }

    /// Number of registered tile groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Default for TileGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

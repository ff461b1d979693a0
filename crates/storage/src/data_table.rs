//! Tables: schema, tile groups and indexes
//!
//! A `DataTable` appends tuples into its last tile group, adding a fresh
//! group when that one is full, and registers each new location with its
//! indexes. The table does not decide visibility; the transaction manager
//! stamps the slot header after the insert.

use crate::index::Index;
use crate::layout::{Layout, LayoutType};
use crate::registry::TileGroupRegistry;
use crate::tile_group::TileGroup;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tilestore_core::{Error, ItemPointer, Oid, Result, Schema, Value};
use tracing::debug;

/// Default number of slots per tile group
pub const DEFAULT_TUPLES_PER_TILE_GROUP: u32 = 1000;

/// One relational table
#[derive(Debug)]
pub struct DataTable {
    oid: Oid,
    database_oid: Oid,
    name: String,
    schema: Schema,
    tuples_per_tile_group: u32,
    layout_type: LayoutType,
    tile_groups: RwLock<Vec<Arc<TileGroup>>>,
    indexes: RwLock<Vec<Arc<Index>>>,
    tuple_count: AtomicU64,
    /// Serializes uniqueness checks with index registration
    index_lock: Mutex<()>,
    registry: Arc<TileGroupRegistry>,
}

impl DataTable {
    /// Create a table with one empty default tile group
    pub fn new(
        oid: Oid,
        database_oid: Oid,
        name: impl Into<String>,
        schema: Schema,
        tuples_per_tile_group: u32,
        layout_type: LayoutType,
        registry: Arc<TileGroupRegistry>,
    ) -> Result<Self> {
        if tuples_per_tile_group == 0 {
            return Err(Error::InvalidOperation(
                "tuples per tile group must be positive".into(),
            ));
        }
        let table = DataTable {
            oid,
            database_oid,
            name: name.into(),
            schema,
            tuples_per_tile_group,
            layout_type,
            tile_groups: RwLock::new(Vec::new()),
            indexes: RwLock::new(Vec::new()),
            tuple_count: AtomicU64::new(0),
            index_lock: Mutex::new(()),
            registry,
        };
        table.add_default_tile_group()?;
        Ok(table)
    }

    /// Table oid
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Owning database oid
    pub fn database_oid(&self) -> Oid {
        self.database_oid
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Slots per tile group
    pub fn tuples_per_tile_group(&self) -> u32 {
        self.tuples_per_tile_group
    }

    /// Layout strategy of new tile groups
    pub fn layout_type(&self) -> LayoutType {
        self.layout_type
    }

    /// Number of tuples inserted into the table's storage
    pub fn tuple_count(&self) -> u64 {
        self.tuple_count.load(Ordering::Acquire)
    }

    /// Overwrite the tuple count
    pub fn set_tuple_count(&self, count: u64) {
        self.tuple_count.store(count, Ordering::Release);
    }

    /// Layout used for new tile groups
    pub fn default_layout(&self) -> Layout {
        Layout::for_type(self.layout_type, self.schema.column_count())
    }

    /// Append an empty tile group with a freshly allocated id
    pub fn add_default_tile_group(&self) -> Result<Arc<TileGroup>> {
        let group = Arc::new(TileGroup::new(
            self.registry.next_id(),
            self.database_oid,
            self.oid,
            self.tuples_per_tile_group,
            self.default_layout(),
        ));
        self.add_tile_group(Arc::clone(&group))?;
        debug!(table = %self.name, tile_group = group.id(), "Added tile group");
        Ok(group)
    }

    /// Attach an existing tile group and register it
    pub fn add_tile_group(&self, group: Arc<TileGroup>) -> Result<()> {
        if group.layout().column_count() != self.schema.column_count() {
            return Err(Error::InvalidOperation(format!(
                "tile group {} has {} columns, table {} has {}",
                group.id(),
                group.layout().column_count(),
                self.name,
                self.schema.column_count()
            )));
        }
        self.registry.register(Arc::clone(&group))?;
        self.tile_groups.write().push(group);
        Ok(())
    }

    /// Detach and unregister every tile group, clear the indexes and reset
    /// the tuple count. Returns the ids that were dropped.
    pub fn drop_tile_groups(&self) -> Vec<Oid> {
        let dropped: Vec<Arc<TileGroup>> = std::mem::take(&mut *self.tile_groups.write());
        for group in &dropped {
            self.registry.unregister(group.id());
        }
        for index in self.indexes.read().iter() {
            index.clear();
        }
        self.set_tuple_count(0);
        dropped.iter().map(|g| g.id()).collect()
    }

    /// Number of tile groups
    pub fn tile_group_count(&self) -> usize {
        self.tile_groups.read().len()
    }

    /// Tile group at `offset`
    pub fn tile_group(&self, offset: usize) -> Option<Arc<TileGroup>> {
        self.tile_groups.read().get(offset).cloned()
    }

    /// Tile group with `id`, if it belongs to this table
    pub fn tile_group_by_id(&self, id: Oid) -> Option<Arc<TileGroup>> {
        self.tile_groups.read().iter().find(|g| g.id() == id).cloned()
    }

    /// Snapshot of the tile group list
    pub fn tile_groups(&self) -> Vec<Arc<TileGroup>> {
        self.tile_groups.read().clone()
    }

    /// Add an index; existing tuples are not back-filled
    pub fn add_index(&self, index: Arc<Index>) {
        self.indexes.write().push(index);
    }

    /// Snapshot of the index list
    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().clone()
    }

    /// Index with `oid`
    pub fn index_with_oid(&self, oid: Oid) -> Option<Arc<Index>> {
        self.indexes.read().iter().find(|i| i.oid() == oid).cloned()
    }

    /// Values stored at `location`
    pub fn tuple_at(&self, location: ItemPointer) -> Option<Vec<Value>> {
        self.tile_group_by_id(location.block)?
            .tuple(location.offset)
    }

    /// Validate and store a tuple, then register it with every index.
    ///
    /// Rejects a key that a unique index already maps to a live version.
    /// The new slot is reserved, so it blocks its keys until a transaction
    /// claims it or [`DataTable::release_tuple`] gives it up.
    pub fn insert_tuple(&self, values: &[Value]) -> Result<ItemPointer> {
        self.schema.validate_tuple(values)?;
        let _guard = self.index_lock.lock();
        let keys = self.check_unique(values)?;
        let location = self.allocate(values)?;
        self.register_keys(keys, location);
        self.tuple_count.fetch_add(1, Ordering::AcqRel);
        Ok(location)
    }

    /// Register a tuple that is already stored at `location` with every
    /// index and count it. Used when storage is filled directly.
    pub fn insert_tuple_at(&self, values: &[Value], location: ItemPointer) -> Result<()> {
        if self.tile_group_by_id(location.block).is_none() {
            return Err(Error::NotFound(format!(
                "tile group {} in table {}",
                location.block, self.name
            )));
        }
        let _guard = self.index_lock.lock();
        let keys = self.check_unique(values)?;
        self.register_keys(keys, location);
        self.tuple_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Give up a reserved slot that no transaction will claim
    ///
    /// Returns false when the slot is not reserved, leaving it untouched.
    pub fn release_tuple(&self, location: ItemPointer) -> bool {
        let group = match self.tile_group_by_id(location.block) {
            Some(group) => group,
            None => return false,
        };
        let _guard = self.index_lock.lock();
        if !group.header().is_reserved(location.offset) {
            return false;
        }
        group.header().release(location.offset);
        self.tuple_count.fetch_sub(1, Ordering::AcqRel);
        true
    }

    fn allocate(&self, values: &[Value]) -> Result<ItemPointer> {
        loop {
            let last = self.tile_groups.read().last().cloned();
            let group = match last {
                Some(group) => group,
                None => self.add_default_tile_group()?,
            };
            if let Some(slot) = group.insert_tuple(values)? {
                return Ok(ItemPointer::new(group.id(), slot));
            }
            // Another writer may have appended a group already
            let appended = self
                .tile_groups
                .read()
                .last()
                .map(|g| g.id() != group.id())
                .unwrap_or(false);
            if !appended {
                self.add_default_tile_group()?;
            }
        }
    }

    fn check_unique(&self, values: &[Value]) -> Result<Vec<(Arc<Index>, Vec<u8>)>> {
        let mut keys = Vec::new();
        for index in self.indexes.read().iter() {
            let key = match index.key_of(values)? {
                Some(key) => key,
                None => continue,
            };
            if index.is_unique() {
                let conflict = index
                    .scan_key(&key)
                    .into_iter()
                    .any(|location| self.is_live(location));
                if conflict {
                    return Err(Error::ConstraintViolation(format!(
                        "duplicate key in unique index {}",
                        index.name()
                    )));
                }
            }
            keys.push((Arc::clone(index), key));
        }
        Ok(keys)
    }

    fn register_keys(&self, keys: Vec<(Arc<Index>, Vec<u8>)>, location: ItemPointer) {
        for (index, key) in keys {
            index.insert_entry(key, location);
        }
    }

    fn is_live(&self, location: ItemPointer) -> bool {
        self.tile_group_by_id(location.block)
            .map(|g| g.header().is_live(location.offset))
            .unwrap_or(false)
    }
}

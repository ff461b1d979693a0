//! Tile groups: fixed-capacity containers of tuple slots
//!
//! Each tile group owns a header with per-slot MVCC metadata and one tile
//! per layout partition. Slots are allocated once and never reused, so a
//! location `(tile_group_id, offset)` names the same version for the life
//! of the tile group.

use crate::layout::Layout;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tilestore_core::{
    CommitId, Error, Oid, Result, SerializeInput, SerializeOutput, TxnId, Value, INVALID_CID, INVALID_TXN_ID,
    MAX_CID,
};

/// Upper bound on slots accepted when decoding a tile group descriptor
pub const MAX_TILE_GROUP_CAPACITY: u32 = 1 << 20;

#[derive(Debug)]
struct SlotHeader {
    txn_id: AtomicU64,
    begin_cid: AtomicU64,
    end_cid: AtomicU64,
}

impl SlotHeader {
    fn empty() -> Self {
        SlotHeader {
            txn_id: AtomicU64::new(INVALID_TXN_ID),
            begin_cid: AtomicU64::new(MAX_CID),
            end_cid: AtomicU64::new(MAX_CID),
        }
    }
}

/// Per-slot transaction metadata of one tile group
///
/// A fresh slot is owned by `INVALID_TXN_ID` with both commit ids at
/// `MAX_CID`. Once handed out it stays reserved until a writer takes
/// ownership with [`compare_and_set_txn_id`] or the slot is released.
///
/// [`compare_and_set_txn_id`]: TileGroupHeader::compare_and_set_txn_id
#[derive(Debug)]
pub struct TileGroupHeader {
    slots: Box<[SlotHeader]>,
    next_tuple_slot: AtomicU32,
}

impl TileGroupHeader {
    /// Header with `capacity` empty slots
    pub fn new(capacity: u32) -> Self {
        TileGroupHeader {
            slots: (0..capacity).map(|_| SlotHeader::empty()).collect(),
            next_tuple_slot: AtomicU32::new(0),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of slots handed out so far
    pub fn next_tuple_slot(&self) -> u32 {
        self.next_tuple_slot
            .load(Ordering::Acquire)
            .min(self.capacity())
    }

    /// Claim the next free slot, or `None` when full
    pub fn allocate_slot(&self) -> Option<u32> {
        let capacity = self.capacity();
        self.next_tuple_slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < capacity).then_some(next + 1)
            })
            .ok()
    }

    /// Owning transaction of `slot`
    pub fn txn_id(&self, slot: u32) -> TxnId {
        self.slots[slot as usize].txn_id.load(Ordering::Acquire)
    }

    /// Set the owning transaction of `slot`
    pub fn set_txn_id(&self, slot: u32, txn_id: TxnId) {
        self.slots[slot as usize]
            .txn_id
            .store(txn_id, Ordering::Release);
    }

    /// Atomically replace the owner if it still equals `expected`
    pub fn compare_and_set_txn_id(&self, slot: u32, expected: TxnId, txn_id: TxnId) -> bool {
        self.slots[slot as usize]
            .txn_id
            .compare_exchange(expected, txn_id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Commit id at which the version became visible
    pub fn begin_cid(&self, slot: u32) -> CommitId {
        self.slots[slot as usize].begin_cid.load(Ordering::Acquire)
    }

    /// Set the begin commit id
    pub fn set_begin_cid(&self, slot: u32, cid: CommitId) {
        self.slots[slot as usize]
            .begin_cid
            .store(cid, Ordering::Release);
    }

    /// Commit id at which the version stopped being visible
    pub fn end_cid(&self, slot: u32) -> CommitId {
        self.slots[slot as usize].end_cid.load(Ordering::Acquire)
    }

    /// Set the end commit id
    pub fn set_end_cid(&self, slot: u32, cid: CommitId) {
        self.slots[slot as usize].end_cid.store(cid, Ordering::Release);
    }

    /// True for a handed-out slot that no transaction has claimed or
    /// released yet
    pub fn is_reserved(&self, slot: u32) -> bool {
        slot < self.next_tuple_slot()
            && self.txn_id(slot) == INVALID_TXN_ID
            && self.begin_cid(slot) == MAX_CID
            && self.end_cid(slot) == MAX_CID
    }

    /// Mark the slot dead for good: aborted or discarded inserts
    pub fn release(&self, slot: u32) {
        self.set_txn_id(slot, INVALID_TXN_ID);
        self.set_end_cid(slot, INVALID_CID);
    }

    /// True while the slot holds a version that has not been deleted by a
    /// committed transaction. Reserved slots count as live.
    pub fn is_live(&self, slot: u32) -> bool {
        if slot >= self.capacity() {
            return false;
        }
        self.is_reserved(slot)
            || (self.txn_id(slot) != INVALID_TXN_ID && self.end_cid(slot) == MAX_CID)
    }
}

#[derive(Debug)]
struct Tile {
    column_count: usize,
    rows: RwLock<Vec<Option<Box<[Value]>>>>,
}

/// Fixed-capacity physical container of tuple slots for one table
#[derive(Debug)]
pub struct TileGroup {
    id: Oid,
    database_oid: Oid,
    table_oid: Oid,
    layout: Layout,
    header: TileGroupHeader,
    tiles: Vec<Tile>,
}

impl TileGroup {
    /// Create an empty tile group
    pub fn new(id: Oid, database_oid: Oid, table_oid: Oid, capacity: u32, layout: Layout) -> Self {
        let tiles = (0..layout.tile_count())
            .map(|t| Tile {
                column_count: layout.columns_of(t).len(),
                rows: RwLock::new((0..capacity).map(|_| None).collect()),
            })
            .collect();
        TileGroup {
            id,
            database_oid,
            table_oid,
            layout,
            header: TileGroupHeader::new(capacity),
            tiles,
        }
    }

    /// Tile group id
    pub fn id(&self) -> Oid {
        self.id
    }

    /// Owning database
    pub fn database_oid(&self) -> Oid {
        self.database_oid
    }

    /// Owning table
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// Slot capacity
    pub fn capacity(&self) -> u32 {
        self.header.capacity()
    }

    /// Column layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// MVCC header
    pub fn header(&self) -> &TileGroupHeader {
        &self.header
    }

    /// Number of slots allocated so far
    pub fn allocated_slots(&self) -> u32 {
        self.header.next_tuple_slot()
    }

    /// Copy `values` into the next free slot. Returns `None` when full.
    ///
    /// The slot header is left untouched, so the slot stays reserved until
    /// the inserting transaction takes ownership.
    pub fn insert_tuple(&self, values: &[Value]) -> Result<Option<u32>> {
        if values.len() != self.layout.column_count() {
            return Err(Error::InvalidOperation(format!(
                "tile group {} expects {} values, got {}",
                self.id,
                self.layout.column_count(),
                values.len()
            )));
        }
        let slot = match self.header.allocate_slot() {
            Some(slot) => slot,
            None => return Ok(None),
        };
        for (t, tile) in self.tiles.iter().enumerate() {
            let row: Box<[Value]> = self
                .layout
                .columns_of(t)
                .into_iter()
                .map(|c| values[c].clone())
                .collect();
            debug_assert_eq!(row.len(), tile.column_count);
            tile.rows.write()[slot as usize] = Some(row);
        }
        Ok(Some(slot))
    }

    /// Value of `column` in `slot`
    pub fn value(&self, slot: u32, column: usize) -> Option<Value> {
        let (tile, position) = self.layout.locate(column)?;
        let rows = self.tiles.get(tile)?.rows.read();
        rows.get(slot as usize)?
            .as_ref()
            .and_then(|row| row.get(position).cloned())
    }

    /// All values of `slot` in column order
    pub fn tuple(&self, slot: u32) -> Option<Vec<Value>> {
        (0..self.layout.column_count())
            .map(|c| self.value(slot, c))
            .collect()
    }

    /// Append the structural descriptor: id, owner oids, capacity, layout
    pub fn serialize_to(&self, out: &mut SerializeOutput) {
        out.write_u32(self.id);
        out.write_u32(self.database_oid);
        out.write_u32(self.table_oid);
        out.write_u32(self.capacity());
        self.layout.serialize_to(out);
    }

    /// Rebuild an empty tile group from its structural descriptor
    pub fn deserialize_from(input: &mut SerializeInput<'_>) -> Result<TileGroup> {
        let id = input.read_u32()?;
        let database_oid = input.read_u32()?;
        let table_oid = input.read_u32()?;
        let capacity = input.read_u32()?;
        if capacity == 0 || capacity > MAX_TILE_GROUP_CAPACITY {
            return Err(Error::format(format!(
                "tile group {} has invalid capacity {}",
                id, capacity
            )));
        }
        let layout = Layout::deserialize_from(input)?;
        Ok(TileGroup::new(id, database_oid, table_oid, capacity, layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutType;
    use tilestore_core::INITIAL_TXN_ID;

    fn group(capacity: u32, layout: Layout) -> TileGroup {
        TileGroup::new(7, 2, 3, capacity, layout)
    }

    #[test]
    fn test_fresh_slot_header() {
        let header = TileGroupHeader::new(2);
        assert_eq!(header.txn_id(0), INVALID_TXN_ID);
        assert_eq!(header.begin_cid(0), MAX_CID);
        assert_eq!(header.end_cid(0), MAX_CID);
        assert!(!header.is_live(0));
    }

    #[test]
    fn test_allocate_until_full() {
        let header = TileGroupHeader::new(2);
        assert_eq!(header.allocate_slot(), Some(0));
        assert_eq!(header.allocate_slot(), Some(1));
        assert_eq!(header.allocate_slot(), None);
        assert_eq!(header.next_tuple_slot(), 2);
    }

    #[test]
    fn test_compare_and_set_owner() {
        let header = TileGroupHeader::new(1);
        header.set_txn_id(0, INITIAL_TXN_ID);
        assert!(!header.compare_and_set_txn_id(0, 9, 10));
        assert!(header.compare_and_set_txn_id(0, INITIAL_TXN_ID, 10));
        assert_eq!(header.txn_id(0), 10);
    }

    #[test]
    fn test_handed_out_slot_is_reserved_until_claimed_or_released() {
        let header = TileGroupHeader::new(4);
        let claimed = header.allocate_slot().unwrap();
        let released = header.allocate_slot().unwrap();
        assert!(header.is_reserved(claimed));
        assert!(header.is_live(claimed));

        assert!(header.compare_and_set_txn_id(claimed, INVALID_TXN_ID, 12));
        assert!(!header.is_reserved(claimed));
        assert!(header.is_live(claimed));

        header.release(released);
        assert!(!header.is_reserved(released));
        assert!(!header.is_live(released));
        assert!(!header.is_reserved(2));
    }

    #[test]
    fn test_insert_and_read_across_layouts() {
        let values = vec![Value::Integer(1), Value::Varchar("a".into()), Value::BigInt(9)];
        for layout_type in [LayoutType::Row, LayoutType::Column, LayoutType::Hybrid] {
            let tg = group(4, Layout::for_type(layout_type, 3));
            let slot = tg.insert_tuple(&values).unwrap().unwrap();
            assert_eq!(tg.tuple(slot).unwrap(), values);
            assert_eq!(tg.value(slot, 1), Some(Value::Varchar("a".into())));
        }
    }

    #[test]
    fn test_insert_into_full_group() {
        let tg = group(1, Layout::row(1));
        assert_eq!(tg.insert_tuple(&[Value::Integer(1)]).unwrap(), Some(0));
        assert_eq!(tg.insert_tuple(&[Value::Integer(2)]).unwrap(), None);
    }

    #[test]
    fn test_insert_wrong_arity() {
        let tg = group(1, Layout::row(2));
        assert!(tg.insert_tuple(&[Value::Integer(1)]).is_err());
    }

    #[test]
    fn test_unfilled_slot_has_no_tuple() {
        let tg = group(2, Layout::row(1));
        assert!(tg.tuple(1).is_none());
        assert!(tg.value(5, 0).is_none());
    }

    #[test]
    fn test_descriptor_keeps_identity() {
        let tg = group(16, Layout::hybrid(vec![0, 1, 0]).unwrap());
        tg.insert_tuple(&[Value::Integer(1), Value::Integer(2), Value::Integer(3)])
            .unwrap();
        let mut out = SerializeOutput::new();
        tg.serialize_to(&mut out);
        let rebuilt = TileGroup::deserialize_from(&mut SerializeInput::new(out.data())).unwrap();
        assert_eq!(rebuilt.id(), 7);
        assert_eq!(rebuilt.database_oid(), 2);
        assert_eq!(rebuilt.table_oid(), 3);
        assert_eq!(rebuilt.capacity(), 16);
        assert_eq!(rebuilt.layout(), tg.layout());
        assert_eq!(rebuilt.allocated_slots(), 0);
    }

    #[test]
    fn test_truncated_descriptor() {
        let tg = group(4, Layout::row(2));
        let mut out = SerializeOutput::new();
        tg.serialize_to(&mut out);
        let bytes = &out.data()[..out.size() - 3];
        assert!(TileGroup::deserialize_from(&mut SerializeInput::new(bytes))
            .unwrap_err()
            .is_format());
    }
}

//! Transaction manager for timestamp-ordered MVCC
//!
//! Read ids and commit ids come from one monotone counter, so a commit id
//! is always newer than the read id of every transaction that began before
//! it. Commit stamping runs under the write side of `commit_lock` and
//! `begin` takes the read side, so a new snapshot never observes a commit
//! that is only partly stamped.
//!
//! ## Slot protocol
//!
//! ```text
//! fresh slot        owner INVALID  begin MAX  end MAX
//! perform_insert    owner T        begin MAX  end MAX
//! commit            owner INITIAL  begin c    end MAX
//! perform_delete    owner T        begin b    end MAX
//! commit            owner INITIAL  begin b    end c
//! abort (insert)    owner INVALID
//! abort (delete)    owner INITIAL
//! ```

use crate::transaction::{
    ConflictAvoidance, IsolationLevel, Result, TransactionContext, TransactionError,
    TransactionStatus,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tilestore_core::{
    CommitId, EpochId, ItemPointer, INITIAL_TXN_ID, INVALID_CID, INVALID_TXN_ID, MAX_CID,
};
use tilestore_storage::{StorageManager, TileGroup};
use tracing::{debug, trace};

/// Hands out transaction ids and commit ids and applies commits to slot
/// headers
#[derive(Debug)]
pub struct TransactionManager {
    storage: Arc<StorageManager>,
    next_txn_id: AtomicU64,
    next_cid: AtomicU64,
    commit_lock: RwLock<()>,
}

impl TransactionManager {
    /// Create a transaction manager over `storage`
    pub fn new(storage: Arc<StorageManager>) -> Self {
        TransactionManager {
            storage,
            next_txn_id: AtomicU64::new(INITIAL_TXN_ID + 1),
            next_cid: AtomicU64::new(INVALID_CID + 1),
            commit_lock: RwLock::new(()),
        }
    }

    /// Storage this manager stamps
    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// The commit id the next begin or commit will receive
    pub fn current_cid(&self) -> CommitId {
        self.next_cid.load(Ordering::Acquire)
    }

    /// Begin a serializable transaction with wait-based conflict avoidance
    pub fn begin_transaction(&self) -> TransactionContext {
        self.begin_with(IsolationLevel::Serializable, ConflictAvoidance::Wait)
    }

    /// Begin a transaction with explicit isolation and conflict modes
    pub fn begin_with(
        &self,
        isolation: IsolationLevel,
        conflict: ConflictAvoidance,
    ) -> TransactionContext {
        let _guard = self.commit_lock.read();
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::AcqRel);
        let read_id = self.next_cid.fetch_add(1, Ordering::AcqRel);
        trace!(txn_id, read_id, "Began transaction");
        TransactionContext::new(txn_id, read_id, isolation, conflict)
    }

    /// Ensure every future read and commit id is greater than `epoch`
    pub fn advance_past(&self, epoch: EpochId) {
        self.next_cid
            .fetch_max(epoch.saturating_add(1), Ordering::AcqRel);
    }

    fn tile_group(&self, location: ItemPointer) -> Result<Arc<TileGroup>> {
        Ok(self.storage.tile_group_of(location)?)
    }

    /// Claim a freshly filled slot as an uncommitted insert of `txn`
    pub fn perform_insert(&self, txn: &mut TransactionContext, location: ItemPointer) -> Result<()> {
        txn.ensure_active()?;
        let group = self.tile_group(location)?;
        let header = group.header();
        if !header.is_reserved(location.offset)
            || !header.compare_and_set_txn_id(location.offset, INVALID_TXN_ID, txn.txn_id())
        {
            return Err(TransactionError::Conflict {
                txn_id: txn.txn_id(),
                location,
            });
        }
        header.set_begin_cid(location.offset, MAX_CID);
        header.set_end_cid(location.offset, MAX_CID);
        txn.record_insert(location);
        Ok(())
    }

    /// Claim a visible committed version for deletion by `txn`
    ///
    /// Deleting an own insert discards it immediately.
    pub fn perform_delete(&self, txn: &mut TransactionContext, location: ItemPointer) -> Result<()> {
        txn.ensure_active()?;
        let group = self.tile_group(location)?;
        let header = group.header();
        let slot = location.offset;
        if slot >= header.next_tuple_slot() {
            return Err(TransactionError::Conflict {
                txn_id: txn.txn_id(),
                location,
            });
        }

        if header.txn_id(slot) == txn.txn_id() && txn.forget_insert(location) {
            header.release(slot);
            return Ok(());
        }

        // A version already deleted by a committed writer cannot be deleted again
        let visible = header.begin_cid(slot) <= txn.read_id() && header.end_cid(slot) == MAX_CID;
        if !visible
            || !header.compare_and_set_txn_id(slot, INITIAL_TXN_ID, txn.txn_id())
        {
            return Err(TransactionError::Conflict {
                txn_id: txn.txn_id(),
                location,
            });
        }
        // A deleter may have committed between the check and the claim
        if header.end_cid(slot) != MAX_CID {
            header.set_txn_id(slot, INITIAL_TXN_ID);
            return Err(TransactionError::Conflict {
                txn_id: txn.txn_id(),
                location,
            });
        }
        txn.record_delete(location);
        Ok(())
    }

    /// Whether the version at `location` is visible to `txn`
    ///
    /// Own uncommitted inserts are visible, own deletes are not. Other
    /// versions follow the snapshot rule on `[begin_cid, end_cid)`.
    pub fn is_visible(&self, txn: &TransactionContext, location: ItemPointer) -> Result<bool> {
        let group = self.tile_group(location)?;
        let header = group.header();
        let slot = location.offset;
        if slot >= header.next_tuple_slot() {
            return Ok(false);
        }
        let owner = header.txn_id(slot);
        let begin = header.begin_cid(slot);
        let end = header.end_cid(slot);
        if owner == INVALID_TXN_ID {
            return Ok(false);
        }
        if owner == txn.txn_id() {
            // Own insert has begin MAX, own delete keeps the old begin
            return Ok(begin == MAX_CID);
        }
        if owner != INITIAL_TXN_ID && begin == MAX_CID {
            return Ok(false);
        }
        Ok(begin <= txn.read_id() && txn.read_id() < end)
    }

    /// Commit `txn`, stamping its writes with a fresh commit id
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> Result<CommitId> {
        txn.ensure_active()?;
        if txn.is_read_only() {
            txn.set_status(TransactionStatus::Committed {
                commit_id: txn.read_id(),
            });
            return Ok(txn.read_id());
        }

        let _guard = self.commit_lock.write();
        let commit_id = self.next_cid.fetch_add(1, Ordering::AcqRel);
        for location in txn.inserted() {
            let group = self.tile_group(*location)?;
            group.header().set_begin_cid(location.offset, commit_id);
            group.header().set_txn_id(location.offset, INITIAL_TXN_ID);
        }
        for location in txn.deleted() {
            let group = self.tile_group(*location)?;
            group.header().set_end_cid(location.offset, commit_id);
            group.header().set_txn_id(location.offset, INITIAL_TXN_ID);
        }
        debug!(
            txn_id = txn.txn_id(),
            commit_id,
            inserts = txn.inserted().len(),
            deletes = txn.deleted().len(),
            "Committed transaction"
        );
        txn.set_status(TransactionStatus::Committed { commit_id });
        Ok(commit_id)
    }

    /// Abort `txn`: inserted slots become dead, deleted slots are released
    pub fn abort_transaction(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> Result<()> {
        txn.ensure_active()?;
        for location in txn.inserted() {
            if let Ok(group) = self.tile_group(*location) {
                group.header().release(location.offset);
            }
        }
        for location in txn.deleted() {
            if let Ok(group) = self.tile_group(*location) {
                group.header().set_txn_id(location.offset, INITIAL_TXN_ID);
            }
        }
        let reason = reason.into();
        debug!(txn_id = txn.txn_id(), reason = %reason, "Aborted transaction");
        txn.set_status(TransactionStatus::Aborted { reason });
        Ok(())
    }

    /// End a transaction that only reads. Writes, if any, are committed.
    pub fn end_transaction(&self, txn: &mut TransactionContext) -> Result<CommitId> {
        self.commit_transaction(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestore_core::{Column, Schema, TypeId, Value};
    use tilestore_storage::{DataTable, Database, LayoutType};

    fn setup() -> (TransactionManager, Arc<DataTable>) {
        let storage = Arc::new(StorageManager::new());
        let database = Arc::new(Database::new(2, "db"));
        storage.add_database(Arc::clone(&database)).unwrap();
        let table = Arc::new(
            DataTable::new(
                3,
                2,
                "t",
                Schema::new(vec![Column::new("a", TypeId::Integer)]),
                8,
                LayoutType::Row,
                Arc::clone(storage.registry()),
            )
            .unwrap(),
        );
        database.add_table(Arc::clone(&table)).unwrap();
        (TransactionManager::new(storage), table)
    }

    fn insert(tm: &TransactionManager, table: &DataTable, txn: &mut TransactionContext, v: i32) -> ItemPointer {
        let location = table.insert_tuple(&[Value::Integer(v)]).unwrap();
        tm.perform_insert(txn, location).unwrap();
        location
    }

    #[test]
    fn test_read_ids_are_unique_and_increasing() {
        let (tm, _) = setup();
        let a = tm.begin_transaction();
        let b = tm.begin_transaction();
        assert!(b.read_id() > a.read_id());
        assert!(b.txn_id() > a.txn_id());
        assert!(a.txn_id() > INITIAL_TXN_ID);
    }

    #[test]
    fn test_own_insert_visible_only_to_owner() {
        let (tm, table) = setup();
        let mut writer = tm.begin_transaction();
        let location = insert(&tm, &table, &mut writer, 1);
        let reader = tm.begin_transaction();
        assert!(tm.is_visible(&writer, location).unwrap());
        assert!(!tm.is_visible(&reader, location).unwrap());
    }

    #[test]
    fn test_commit_makes_insert_visible_to_later_snapshots() {
        let (tm, table) = setup();
        let early = tm.begin_transaction();
        let mut writer = tm.begin_transaction();
        let location = insert(&tm, &table, &mut writer, 1);
        let cid = tm.commit_transaction(&mut writer).unwrap();
        let late = tm.begin_transaction();

        assert!(cid > early.read_id());
        assert!(!tm.is_visible(&early, location).unwrap());
        assert!(tm.is_visible(&late, location).unwrap());
        let group = table.tile_group_by_id(location.block).unwrap();
        assert_eq!(group.header().txn_id(location.offset), INITIAL_TXN_ID);
        assert_eq!(group.header().begin_cid(location.offset), cid);
    }

    #[test]
    fn test_delete_keeps_old_snapshots_intact() {
        let (tm, table) = setup();
        let mut writer = tm.begin_transaction();
        let location = insert(&tm, &table, &mut writer, 1);
        tm.commit_transaction(&mut writer).unwrap();

        let before = tm.begin_transaction();
        let mut deleter = tm.begin_transaction();
        tm.perform_delete(&mut deleter, location).unwrap();
        assert!(!tm.is_visible(&deleter, location).unwrap());
        assert!(tm.is_visible(&before, location).unwrap());
        tm.commit_transaction(&mut deleter).unwrap();

        let after = tm.begin_transaction();
        assert!(tm.is_visible(&before, location).unwrap());
        assert!(!tm.is_visible(&after, location).unwrap());
    }

    #[test]
    fn test_concurrent_delete_conflicts() {
        let (tm, table) = setup();
        let mut writer = tm.begin_transaction();
        let location = insert(&tm, &table, &mut writer, 1);
        tm.commit_transaction(&mut writer).unwrap();

        let mut a = tm.begin_transaction();
        let mut b = tm.begin_transaction();
        tm.perform_delete(&mut a, location).unwrap();
        assert!(matches!(
            tm.perform_delete(&mut b, location),
            Err(TransactionError::Conflict { .. })
        ));
    }

    #[test]
    fn test_delete_of_invisible_version_conflicts() {
        let (tm, table) = setup();
        let mut old = tm.begin_transaction();
        let mut writer = tm.begin_transaction();
        let location = insert(&tm, &table, &mut writer, 1);
        tm.commit_transaction(&mut writer).unwrap();
        assert!(tm.perform_delete(&mut old, location).is_err());
    }

    #[test]
    fn test_abort_releases_slots() {
        let (tm, table) = setup();
        let mut writer = tm.begin_transaction();
        let committed = insert(&tm, &table, &mut writer, 1);
        tm.commit_transaction(&mut writer).unwrap();

        let mut txn = tm.begin_transaction();
        let inserted = insert(&tm, &table, &mut txn, 2);
        tm.perform_delete(&mut txn, committed).unwrap();
        tm.abort_transaction(&mut txn, "test").unwrap();

        let reader = tm.begin_transaction();
        assert!(!tm.is_visible(&reader, inserted).unwrap());
        assert!(tm.is_visible(&reader, committed).unwrap());
        let group = table.tile_group_by_id(inserted.block).unwrap();
        assert_eq!(group.header().txn_id(inserted.offset), INVALID_TXN_ID);
        assert!(matches!(txn.status(), TransactionStatus::Aborted { .. }));
    }

    #[test]
    fn test_delete_own_insert_discards_it() {
        let (tm, table) = setup();
        let mut txn = tm.begin_transaction();
        let location = insert(&tm, &table, &mut txn, 1);
        tm.perform_delete(&mut txn, location).unwrap();
        assert!(txn.is_read_only());
        tm.commit_transaction(&mut txn).unwrap();
        let reader = tm.begin_transaction();
        assert!(!tm.is_visible(&reader, location).unwrap());
    }

    #[test]
    fn test_insert_into_claimed_slot_conflicts() {
        let (tm, table) = setup();
        let mut a = tm.begin_transaction();
        let mut b = tm.begin_transaction();
        let location = insert(&tm, &table, &mut a, 1);
        assert!(tm.perform_insert(&mut b, location).is_err());
    }

    #[test]
    fn test_aborted_insert_slot_cannot_be_reclaimed() {
        let (tm, table) = setup();
        let mut a = tm.begin_transaction();
        let location = insert(&tm, &table, &mut a, 1);
        tm.abort_transaction(&mut a, "test").unwrap();
        let group = table.tile_group_by_id(location.block).unwrap();
        assert!(!group.header().is_live(location.offset));

        let mut b = tm.begin_transaction();
        assert!(matches!(
            tm.perform_insert(&mut b, location),
            Err(TransactionError::Conflict { .. })
        ));
    }

    #[test]
    fn test_finished_transaction_rejects_work() {
        let (tm, table) = setup();
        let mut txn = tm.begin_transaction();
        tm.end_transaction(&mut txn).unwrap();
        let location = table.insert_tuple(&[Value::Integer(1)]).unwrap();
        assert!(matches!(
            tm.perform_insert(&mut txn, location),
            Err(TransactionError::InvalidState(_))
        ));
        assert!(tm.commit_transaction(&mut txn).is_err());
    }

    #[test]
    fn test_advance_past() {
        let (tm, _) = setup();
        tm.advance_past(1_000);
        let txn = tm.begin_transaction();
        assert!(txn.epoch_id() > 1_000);
        tm.advance_past(5);
        assert!(tm.begin_transaction().epoch_id() > txn.epoch_id());
    }
}

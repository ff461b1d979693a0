//! Snapshot visibility of a tuple slot
//!
//! A checkpoint reads every table at one commit id. A slot is visible at
//! snapshot `s` when:
//!
//! - its owner is `INVALID_TXN_ID`: never (empty or aborted insert)
//! - its owner is `INITIAL_TXN_ID`: `begin <= s < end`
//! - any other owner: never while `begin == MAX_CID` (uncommitted
//!   insert), otherwise `begin <= s < end` (pending delete of a committed
//!   version)

use tilestore_core::{CommitId, INITIAL_TXN_ID, INVALID_TXN_ID, MAX_CID};
use tilestore_storage::TileGroupHeader;
use tracing::trace;

/// Whether `slot` holds the version visible at `snapshot`
pub fn is_visible(header: &TileGroupHeader, slot: u32, snapshot: CommitId) -> bool {
    if slot >= header.capacity() {
        return false;
    }
    let owner = header.txn_id(slot);
    let begin = header.begin_cid(slot);
    let end = header.end_cid(slot);

    let visible = match owner {
        INVALID_TXN_ID => false,
        INITIAL_TXN_ID => begin <= snapshot && snapshot < end,
        _ if begin == MAX_CID => false,
        _ => begin <= snapshot && snapshot < end,
    };
    if !visible {
        trace!(target: "tilestore::checkpoint", slot, owner, begin, end, snapshot, "Slot not visible");
    }
    visible
}

/// Allocated slots of `header` visible at `snapshot`, in slot order
pub fn visible_slots(header: &TileGroupHeader, snapshot: CommitId) -> Vec<u32> {
    (0..header.next_tuple_slot())
        .filter(|slot| is_visible(header, *slot, snapshot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header_with(owner: u64, begin: CommitId, end: CommitId) -> TileGroupHeader {
        let header = TileGroupHeader::new(1);
        header.allocate_slot();
        header.set_txn_id(0, owner);
        header.set_begin_cid(0, begin);
        header.set_end_cid(0, end);
        header
    }

    #[test]
    fn test_invalid_owner_is_never_visible() {
        let header = header_with(INVALID_TXN_ID, 1, MAX_CID);
        assert!(!is_visible(&header, 0, 5));
        assert!(!is_visible(&TileGroupHeader::new(1), 0, 5));
    }

    #[test]
    fn test_baseline_owner_uses_interval() {
        let committed = header_with(INITIAL_TXN_ID, 4, MAX_CID);
        assert!(!is_visible(&committed, 0, 3));
        assert!(is_visible(&committed, 0, 4));
        assert!(is_visible(&committed, 0, 100));

        let deleted = header_with(INITIAL_TXN_ID, 4, 8);
        assert!(is_visible(&deleted, 0, 7));
        assert!(!is_visible(&deleted, 0, 8));

        let uncommitted = header_with(INITIAL_TXN_ID, MAX_CID, MAX_CID);
        assert!(!is_visible(&uncommitted, 0, 100));
    }

    #[test]
    fn test_other_owner() {
        // Uncommitted insert
        assert!(!is_visible(&header_with(42, MAX_CID, MAX_CID), 0, 100));
        // Committed version with a delete in progress
        let pending_delete = header_with(42, 4, MAX_CID);
        assert!(is_visible(&pending_delete, 0, 4));
        assert!(!is_visible(&pending_delete, 0, 3));
        // Commit being stamped after the snapshot was taken
        assert!(!is_visible(&header_with(42, 9, MAX_CID), 0, 8));
    }

    #[test]
    fn test_out_of_range_slot() {
        let header = header_with(INITIAL_TXN_ID, 1, MAX_CID);
        assert!(!is_visible(&header, 1, 5));
        assert!(!is_visible(&header, u32::MAX, 5));
    }

    #[test]
    fn test_visible_slots_skips_unallocated() {
        let header = TileGroupHeader::new(4);
        for slot in 0..3 {
            header.allocate_slot();
            header.set_txn_id(slot, INITIAL_TXN_ID);
            header.set_begin_cid(slot, 2);
        }
        header.set_end_cid(1, 3);
        assert_eq!(visible_slots(&header, 5), vec![0, 2]);
        assert_eq!(visible_slots(&header, 2), vec![0, 1, 2]);
        assert_eq!(visible_slots(&header, 1), Vec::<u32>::new());
    }

    fn owner_strategy() -> impl Strategy<Value = u64> {
        prop_oneof![
            Just(INVALID_TXN_ID),
            Just(INITIAL_TXN_ID),
            2u64..1_000,
        ]
    }

    fn cid_strategy() -> impl Strategy<Value = CommitId> {
        prop_oneof![Just(MAX_CID), 1u64..64]
    }

    proptest! {
        #[test]
        fn prop_matches_interval_rule(
            owner in owner_strategy(),
            begin in cid_strategy(),
            end in cid_strategy(),
            snapshot in 1u64..64,
        ) {
            let header = header_with(owner, begin, end);
            let in_interval = begin <= snapshot && snapshot < end;
            let expected = match owner {
                INVALID_TXN_ID => false,
                INITIAL_TXN_ID => in_interval,
                _ => begin != MAX_CID && in_interval,
            };
            prop_assert_eq!(is_visible(&header, 0, snapshot), expected);
        }

        #[test]
        fn prop_visibility_is_monotone_until_end(
            begin in 1u64..32,
            len in 1u64..32,
            snapshot in 1u64..96,
        ) {
            let end = begin + len;
            let header = header_with(INITIAL_TXN_ID, begin, end);
            prop_assert_eq!(
                is_visible(&header, 0, snapshot),
                (begin..end).contains(&snapshot)
            );
        }
    }
}

//! Transaction context for timestamp-ordered MVCC
//!
//! A `TransactionContext` records the snapshot a transaction reads at and
//! the slots it has claimed. The `TransactionManager` stamps those slots
//! when the transaction commits or releases them when it aborts.

use tilestore_core::{CommitId, EpochId, ItemPointer, TxnId};

/// Error type for transaction operations
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Another transaction owns the version, or it is not visible to us
    #[error("Write-write conflict on {location} for txn {txn_id}")]
    Conflict {
        /// Transaction that lost
        txn_id: TxnId,
        /// Contended slot
        location: ItemPointer,
    },

    /// Operation is not allowed in the transaction's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage lookup failed
    #[error(transparent)]
    Storage(#[from] tilestore_core::Error),
}

/// Result type alias for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Isolation level a transaction runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Serializable
    #[default]
    Serializable,
    /// Snapshot isolation
    Snapshot,
    /// Repeatable read
    RepeatableRead,
    /// Read committed
    ReadCommitted,
}

/// What a transaction does when it meets a conflicting writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictAvoidance {
    /// Wait for the other writer
    #[default]
    Wait,
    /// Abort immediately
    Abort,
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Committed` (commit or end)
/// - `Active` → `Aborted` (abort)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction committed at the given commit id
    Committed {
        /// Commit id stamped on its writes
        commit_id: CommitId,
    },
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// Per-transaction state
#[derive(Debug)]
pub struct TransactionContext {
    txn_id: TxnId,
    read_id: CommitId,
    isolation: IsolationLevel,
    conflict: ConflictAvoidance,
    status: TransactionStatus,
    inserted: Vec<ItemPointer>,
    deleted: Vec<ItemPointer>,
}

impl TransactionContext {
    pub(crate) fn new(
        txn_id: TxnId,
        read_id: CommitId,
        isolation: IsolationLevel,
        conflict: ConflictAvoidance,
    ) -> Self {
        TransactionContext {
            txn_id,
            read_id,
            isolation,
            conflict,
            status: TransactionStatus::Active,
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Transaction id
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Snapshot commit id: versions committed at or before it are visible
    pub fn read_id(&self) -> CommitId {
        self.read_id
    }

    /// Epoch this transaction belongs to. Equal to the read id, so epochs
    /// are unique and increase with every begin.
    pub fn epoch_id(&self) -> EpochId {
        self.read_id
    }

    /// Isolation level
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Conflict avoidance mode
    pub fn conflict_avoidance(&self) -> ConflictAvoidance {
        self.conflict
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Whether the transaction may still read and write
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Slots this transaction inserted
    pub fn inserted(&self) -> &[ItemPointer] {
        &self.inserted
    }

    /// Slots this transaction deleted
    pub fn deleted(&self) -> &[ItemPointer] {
        &self.deleted
    }

    /// True when nothing was written
    pub fn is_read_only(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }

    /// Commit id, once committed
    pub fn commit_id(&self) -> Option<CommitId> {
        match self.status {
            TransactionStatus::Committed { commit_id } => Some(commit_id),
            _ => None,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransactionError::InvalidState(format!(
                "txn {} is {:?}",
                self.txn_id, self.status
            )))
        }
    }

    pub(crate) fn record_insert(&mut self, location: ItemPointer) {
        self.inserted.push(location);
    }

    pub(crate) fn record_delete(&mut self, location: ItemPointer) {
        self.deleted.push(location);
    }

    /// Forget an own insert that was deleted again. Returns whether it was ours.
    pub(crate) fn forget_insert(&mut self, location: ItemPointer) -> bool {
        match self.inserted.iter().position(|l| *l == location) {
            Some(position) => {
                self.inserted.swap_remove(position);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_active_and_read_only() {
        let txn = TransactionContext::new(2, 5, IsolationLevel::default(), ConflictAvoidance::default());
        assert!(txn.is_active());
        assert!(txn.is_read_only());
        assert_eq!(txn.epoch_id(), 5);
        assert_eq!(txn.isolation(), IsolationLevel::Serializable);
        assert_eq!(txn.conflict_avoidance(), ConflictAvoidance::Wait);
        assert_eq!(txn.commit_id(), None);
    }

    #[test]
    fn test_forget_insert() {
        let mut txn = TransactionContext::new(2, 5, IsolationLevel::Snapshot, ConflictAvoidance::Abort);
        txn.record_insert(ItemPointer::new(1, 0));
        assert!(txn.forget_insert(ItemPointer::new(1, 0)));
        assert!(!txn.forget_insert(ItemPointer::new(1, 0)));
        assert!(txn.is_read_only());
    }

    #[test]
    fn test_terminal_state_is_not_active() {
        let mut txn = TransactionContext::new(2, 5, IsolationLevel::Snapshot, ConflictAvoidance::Abort);
        txn.set_status(TransactionStatus::Committed { commit_id: 9 });
        assert!(txn.ensure_active().is_err());
        assert_eq!(txn.commit_id(), Some(9));
    }
}

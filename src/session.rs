//! Session and transaction bookkeeping consumed by the execution layer.

#[cfg(test)]
mod test;

use crate::bson::{Document, Timestamp};

/// A logical session against the deployment.
///
/// The execution layer only needs a small part of what a session tracks: the id attached to
/// commands, the transaction number used by retryable writes, whether a multi-statement transaction
/// is active, and the causal-consistency timestamps.
#[derive(Clone, Debug, Default)]
pub struct ClientSession {
    id: Option<Document>,
    txn_number: i64,
    dirty: bool,
    pub(crate) transaction: Transaction,
    pub(crate) snapshot_time: Option<Timestamp>,
    pub(crate) operation_time: Option<Timestamp>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Transaction {
    pub(crate) state: TransactionState,
}

impl Transaction {
    pub(crate) fn start(&mut self) {
        self.state = TransactionState::Starting;
    }

    pub(crate) fn commit(&mut self, data_committed: bool) {
        self.state = TransactionState::Committed { data_committed };
    }

    pub(crate) fn abort(&mut self) {
        self.state = TransactionState::Aborted;
    }

    pub(crate) fn reset(&mut self) {
        self.state = TransactionState::None;
    }
}

/// Where a session is in the lifecycle of a multi-statement transaction.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub enum TransactionState {
    #[default]
    None,
    Starting,
    InProgress,
    Committed {
        /// Whether any data was written before the commit.
        data_committed: bool,
    },
    Aborted,
}

impl ClientSession {
    /// Creates a session identified by `id` (the `lsid` sent with every command).
    pub fn new(id: Document) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Creates a session with no server side id. Writes executed with it are never retried.
    pub fn without_id() -> Self {
        Self::default()
    }

    /// The id of this session, if it has one.
    pub fn id(&self) -> Option<&Document> {
        self.id.as_ref()
    }

    /// Whether this session is currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.state == TransactionState::Starting
            || self.transaction.state == TransactionState::InProgress
    }

    /// The current state of this session's transaction.
    pub fn transaction_state(&self) -> &TransactionState {
        &self.transaction.state
    }

    /// Starts a multi-statement transaction.
    pub fn start_transaction(&mut self) {
        self.transaction.start();
    }

    /// Records that the first statement of the transaction has been sent.
    pub(crate) fn mark_transaction_in_progress(&mut self) {
        if self.transaction.state == TransactionState::Starting {
            self.transaction.state = TransactionState::InProgress;
        }
    }

    /// Marks the transaction committed.
    pub fn commit_transaction(&mut self) {
        let data_committed = self.transaction.state == TransactionState::InProgress;
        self.transaction.commit(data_committed);
    }

    /// Marks the transaction aborted.
    pub fn abort_transaction(&mut self) {
        self.transaction.abort();
    }

    /// Clears any finished transaction.
    pub fn reset_transaction(&mut self) {
        self.transaction.reset();
    }

    /// Gets the current txn_number.
    pub fn txn_number(&self) -> i64 {
        self.txn_number
    }

    /// Increments the txn_number and returns the new value.
    pub fn advance_transaction_number(&mut self) -> i64 {
        self.txn_number += 1;
        self.txn_number
    }

    /// Advance operation time for this session. If the provided timestamp is earlier than this
    /// session's current operation time, then the operation time is unchanged.
    pub fn advance_operation_time(&mut self, ts: Timestamp) {
        self.operation_time = match self.operation_time {
            Some(current_op_time) if current_op_time < ts => Some(ts),
            None => Some(ts),
            _ => self.operation_time,
        }
    }

    /// The operation time returned by the last operation executed in this session.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time
    }

    /// The snapshot time pinned by the first read of a snapshot session.
    pub fn snapshot_time(&self) -> Option<Timestamp> {
        self.snapshot_time
    }

    pub(crate) fn set_snapshot_time(&mut self, ts: Timestamp) {
        if self.snapshot_time.is_none() {
            self.snapshot_time = Some(ts);
        }
    }

    /// Mark this session as dirty after a network error so that it is not reused.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a network error occurred while this session was in use.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

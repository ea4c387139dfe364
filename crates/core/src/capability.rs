//! Per-DBMS isolation semantics.
//!
//! Which isolation levels read from a transaction-wide snapshot, when that
//! snapshot is taken, and whether concurrent updates are rejected differ
//! between database engines. The checkers take these facts as data rather
//! than hard-coding one engine's behavior.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::trace::{IsolationLevel, OperationKind, ReadMode, TraceRecord};

/// The operation that establishes a transaction-wide snapshot.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPoint {
    /// The first non-locking `SELECT` (`InnoDB`).
    #[default]
    FirstConsistentRead,
    /// The first statement of any kind (`PostgreSQL`).
    FirstStatement,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub dbms: String,
    /// Levels under which consistent reads share one snapshot per transaction.
    /// Every other level takes a fresh snapshot per statement.
    pub transaction_snapshot: Vec<IsolationLevel>,
    /// Levels under which a write to a key committed by a concurrent
    /// transaction after the snapshot must fail.
    pub first_updater_wins: Vec<IsolationLevel>,
    pub snapshot_point: SnapshotPoint,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::mysql()
    }
}

impl Capabilities {
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            dbms: "mysql".into(),
            transaction_snapshot: vec![IsolationLevel::RepeatableRead],
            first_updater_wins: Vec::new(),
            snapshot_point: SnapshotPoint::FirstConsistentRead,
        }
    }

    #[must_use]
    pub fn postgresql() -> Self {
        Self {
            dbms: "postgresql".into(),
            transaction_snapshot: vec![
                IsolationLevel::RepeatableRead,
                IsolationLevel::Serializable,
            ],
            first_updater_wins: vec![
                IsolationLevel::RepeatableRead,
                IsolationLevel::Serializable,
            ],
            snapshot_point: SnapshotPoint::FirstStatement,
        }
    }

    #[must_use]
    pub fn uses_transaction_snapshot(&self, level: IsolationLevel) -> bool {
        self.transaction_snapshot.contains(&level)
    }

    #[must_use]
    pub fn enforces_first_updater_wins(&self, level: IsolationLevel) -> bool {
        self.first_updater_wins.contains(&level)
    }

    /// `true` if `record` is the kind of operation that fixes the snapshot of
    /// a transaction running at `level`.
    #[must_use]
    pub fn takes_snapshot(&self, level: IsolationLevel, record: &TraceRecord) -> bool {
        if !self.uses_transaction_snapshot(level) || !record.kind.is_data() {
            return false;
        }
        match self.snapshot_point {
            SnapshotPoint::FirstConsistentRead => {
                record.kind == OperationKind::Select && record.read_mode == ReadMode::ConsistentRead
            }
            SnapshotPoint::FirstStatement => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{LockMode, OperationId, TransactionId};

    fn op(kind: OperationKind, read_mode: ReadMode) -> TraceRecord {
        TraceRecord {
            operation_id: OperationId(0),
            transaction_id: TransactionId(0),
            thread_id: 0,
            kind,
            start_ts: 0,
            finish_ts: 1,
            isolation_level: None,
            lock_mode: LockMode::NonLock,
            read_mode,
            read_tuples: Vec::new(),
            write_tuples: Vec::new(),
        }
    }

    #[test]
    fn mysql_snapshots_on_first_consistent_read() {
        let caps = Capabilities::mysql();
        let rr = IsolationLevel::RepeatableRead;
        assert!(caps.takes_snapshot(rr, &op(OperationKind::Select, ReadMode::ConsistentRead)));
        assert!(!caps.takes_snapshot(rr, &op(OperationKind::Select, ReadMode::LockingRead)));
        assert!(!caps.takes_snapshot(rr, &op(OperationKind::Update, ReadMode::ConsistentRead)));
        assert!(!caps.takes_snapshot(
            IsolationLevel::ReadCommitted,
            &op(OperationKind::Select, ReadMode::ConsistentRead)
        ));
        assert!(!caps.enforces_first_updater_wins(rr));
    }

    #[test]
    fn postgresql_snapshots_on_first_statement() {
        let caps = Capabilities::postgresql();
        let rr = IsolationLevel::RepeatableRead;
        assert!(caps.takes_snapshot(rr, &op(OperationKind::Update, ReadMode::ConsistentRead)));
        assert!(!caps.takes_snapshot(rr, &op(OperationKind::Start, ReadMode::ConsistentRead)));
        assert!(caps.enforces_first_updater_wins(IsolationLevel::Serializable));
        assert!(!caps.enforces_first_updater_wins(IsolationLevel::ReadCommitted));
    }
}

//! Per-transaction summaries and the set of transactions still in play.

use alloc::collections::BTreeSet;

use hashbrown::HashMap;

use crate::capability::Capabilities;
use crate::error::Error;
use crate::trace::{
    Interval, IsolationLevel, LockMode, OperationId, OperationKind, OpRef, ReadMode, Timestamp,
    TraceRecord, TransactionId,
};

/// How a transaction ended.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndKind {
    Commit,
    Rollback,
}

/// The consistent-read snapshot of a transaction, pinned to the operation
/// that took it.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub interval: Interval,
    pub operation: OperationId,
}

/// Summary of one transaction.
///
/// Created by its `Start` record and *perfect* once its `Commit` or
/// `Rollback` has been seen. A perfect profile never changes again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub transaction: TransactionId,
    pub begin: Interval,
    pub begin_op: OperationId,
    pub end: Option<Interval>,
    pub end_op: Option<OperationId>,
    pub end_kind: Option<EndKind>,
    pub isolation_level: IsolationLevel,
    /// No record-level lock was ever requested.
    pub is_non_locking: bool,
    /// At least one consistent (snapshot) read was issued, or a statement
    /// fixed the transaction snapshot.
    pub uses_consistent_read: bool,
    /// Set lazily by the operation that takes the transaction-wide snapshot.
    pub snapshot: Option<Snapshot>,
}

impl Profile {
    #[must_use]
    pub fn new(record: &TraceRecord) -> Self {
        Self {
            transaction: record.transaction_id,
            begin: record.interval(),
            begin_op: record.operation_id,
            end: None,
            end_op: None,
            end_kind: None,
            isolation_level: record.isolation_level.unwrap_or_default(),
            is_non_locking: true,
            uses_consistent_read: false,
            snapshot: None,
        }
    }

    #[must_use]
    pub const fn is_perfect(&self) -> bool {
        self.end_kind.is_some()
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.end_kind, Some(EndKind::Commit))
    }

    /// From the start of `begin` to the end of `end`, open-ended while the
    /// transaction is running.
    #[must_use]
    pub fn lifetime(&self) -> Interval {
        Interval::new(
            self.begin.start,
            self.end.map_or(Timestamp::MAX, |end| end.finish),
        )
    }

    /// The terminal operation, once known.
    #[must_use]
    pub fn terminal(&self) -> Option<(Interval, OpRef)> {
        self.end.zip(self.end_op).map(|(interval, operation)| {
            (
                interval,
                OpRef {
                    transaction: self.transaction,
                    operation,
                },
            )
        })
    }

    fn observe(&mut self, record: &TraceRecord, capabilities: &Capabilities) {
        if record.lock_mode != LockMode::NonLock {
            self.is_non_locking = false;
        }
        if record.kind == OperationKind::Select && record.read_mode == ReadMode::ConsistentRead {
            self.uses_consistent_read = true;
        }
        if self.snapshot.is_none() && capabilities.takes_snapshot(self.isolation_level, record) {
            tracing::trace!(
                transaction = %self.transaction,
                operation = %record.operation_id,
                "snapshot taken"
            );
            self.snapshot = Some(Snapshot {
                interval: record.interval(),
                operation: record.operation_id,
            });
            self.uses_consistent_read = true;
        }
    }
}

/// All known profiles plus the *active* set.
///
/// A transaction is active from its `Start` until its terminal record has
/// been analyzed and has left the window; until then some check may still
/// read versions as old as its begin time.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<TransactionId, Profile>,
    active: HashMap<TransactionId, Interval>,
    by_begin: BTreeSet<(Timestamp, TransactionId)>,
}

impl ProfileRegistry {
    /// Registers the transaction opened by a `Start` record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStart`] if the transaction is already known.
    pub fn begin(&mut self, record: &TraceRecord) -> Result<&Profile, Error> {
        let transaction = record.transaction_id;
        if self.profiles.contains_key(&transaction) {
            return Err(Error::DuplicateStart { transaction });
        }
        let begin = record.interval();
        self.active.insert(transaction, begin);
        self.by_begin.insert((begin.start, transaction));
        Ok(self
            .profiles
            .entry(transaction)
            .or_insert_with(|| Profile::new(record)))
    }

    /// Folds a data operation into its transaction's flags and snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProfile`] for an unknown transaction.
    pub fn observe(&mut self, record: &TraceRecord, capabilities: &Capabilities) -> Result<(), Error> {
        self.get_mut(record)?.observe(record, capabilities);
        Ok(())
    }

    /// Completes a profile from its `Commit` or `Rollback` record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProfile`] for an unknown transaction and
    /// [`Error::UnknownTransactionEnd`] if it already ended.
    pub fn finish(&mut self, record: &TraceRecord) -> Result<&Profile, Error> {
        let profile = self.get_mut(record)?;
        if profile.is_perfect() {
            return Err(Error::UnknownTransactionEnd {
                transaction: record.transaction_id,
                operation: record.operation_id,
            });
        }
        profile.end = Some(record.interval());
        profile.end_op = Some(record.operation_id);
        profile.end_kind = Some(if record.kind == OperationKind::Commit {
            EndKind::Commit
        } else {
            EndKind::Rollback
        });
        Ok(profile)
    }

    #[must_use]
    pub fn get(&self, transaction: TransactionId) -> Option<&Profile> {
        self.profiles.get(&transaction)
    }

    /// The profile of the transaction `record` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProfile`] if it is unknown.
    pub fn require(&self, record: &TraceRecord) -> Result<&Profile, Error> {
        self.profiles
            .get(&record.transaction_id)
            .ok_or(Error::MissingProfile {
                transaction: record.transaction_id,
                operation: record.operation_id,
            })
    }

    fn get_mut(&mut self, record: &TraceRecord) -> Result<&mut Profile, Error> {
        self.profiles
            .get_mut(&record.transaction_id)
            .ok_or(Error::MissingProfile {
                transaction: record.transaction_id,
                operation: record.operation_id,
            })
    }

    /// Drops the transaction from the active set.
    pub fn deactivate(&mut self, transaction: TransactionId) {
        if let Some(begin) = self.active.remove(&transaction) {
            self.by_begin.remove(&(begin.start, transaction));
        }
    }

    /// Forgets an inactive profile. Active transactions are kept.
    pub fn remove(&mut self, transaction: TransactionId) -> Option<Profile> {
        if self.is_active(transaction) {
            return None;
        }
        self.profiles.remove(&transaction)
    }

    #[must_use]
    pub fn is_active(&self, transaction: TransactionId) -> bool {
        self.active.contains_key(&transaction)
    }

    /// Earliest begin time among active transactions.
    #[must_use]
    pub fn earliest_active_begin(&self) -> Option<Timestamp> {
        self.by_begin.first().map(|(start, _)| *start)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}

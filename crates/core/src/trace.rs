//! Trace records: the observable effect of one operation against the database.
//!
//! A trace is produced per client thread while the workload runs. Each record
//! carries the wall-clock interval `[start_ts, finish_ts)` during which the
//! operation was in flight, the lock and read modes it used, and the tuples it
//! read and wrote. The engine never talks to the database; everything it knows
//! comes from these records.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};

use derive_more::From;

/// Monotonic nanosecond timestamp.
pub type Timestamp = u64;

/// Column name to observed value.
pub type Values = BTreeMap<String, String>;

/// Identifier of a transaction, unique across the whole run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct TransactionId(pub u64);

/// Identifier of a single operation, unique across the whole run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct OperationId(pub u64);

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "T{}", self.0)
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "#{}", self.0)
    }
}

/// A particular operation of a particular transaction.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpRef {
    pub transaction: TransactionId,
    pub operation: OperationId,
}

impl OpRef {
    #[must_use]
    pub const fn new(transaction: TransactionId, operation: OperationId) -> Self {
        Self {
            transaction,
            operation,
        }
    }
}

impl Display for OpRef {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{}{}", self.transaction, self.operation)
    }
}

/// Half-open time interval `[start, finish)`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: Timestamp,
    pub finish: Timestamp,
}

impl Interval {
    #[must_use]
    pub const fn new(start: Timestamp, finish: Timestamp) -> Self {
        Self { start, finish }
    }

    /// The empty interval located at `ts`.
    #[must_use]
    pub const fn at(ts: Timestamp) -> Self {
        Self {
            start: ts,
            finish: ts,
        }
    }

    /// Standard half-open intersection test.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.finish && other.start < self.finish
    }

    /// `true` if this interval is entirely over when `other` begins.
    #[must_use]
    pub const fn precedes(&self, other: &Self) -> bool {
        self.finish <= other.start
    }

    #[must_use]
    pub const fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.finish
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "[{},{})", self.start, self.finish)
    }
}

/// What an operation did.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Start,
    Select,
    Insert,
    Update,
    Delete,
    Commit,
    Rollback,
    Ddl,
    DistributeSchedule,
    Fault,
}

impl OperationKind {
    /// Insert, Update or Delete.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// Commit or Rollback.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Commit | Self::Rollback)
    }

    /// Operations that touch tuples and are subject to the checkers.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            Self::Select | Self::Insert | Self::Update | Self::Delete
        )
    }

    /// Operations that belong to a transaction at all.
    #[must_use]
    pub const fn is_transactional(self) -> bool {
        !matches!(self, Self::Ddl | Self::DistributeSchedule | Self::Fault)
    }
}

/// Record-level lock requested by an operation.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    #[default]
    NonLock,
    ShareLock,
    ExclusiveLock,
}

impl LockMode {
    /// Pairs of lock modes whose overlap the lock manager must prevent.
    #[must_use]
    pub const fn conflicts_with(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::ShareLock, Self::ExclusiveLock)
                | (Self::ExclusiveLock, Self::ShareLock | Self::ExclusiveLock)
        )
    }
}

/// How a read chooses the version it observes.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    UncommittedRead,
    #[default]
    ConsistentRead,
    LockingRead,
}

/// Isolation level a transaction was started with.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    #[default]
    RepeatableRead,
    Serializable,
}

/// A tuple is addressed by its table and primary key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub table: String,
    pub primary_key: String,
}

impl Key {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{}({})", self.table, self.primary_key)
    }
}

/// One tuple read or written by an operation, with the column values observed.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleTrace {
    pub table: String,
    pub primary_key: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub observed_values: Values,
}

impl TupleTrace {
    pub fn new<C, V>(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        values: impl IntoIterator<Item = (C, V)>,
    ) -> Self
    where
        C: Into<String>,
        V: Into<String>,
    {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            observed_values: values
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn key(&self) -> Key {
        Key::new(self.table.clone(), self.primary_key.clone())
    }

    #[must_use]
    pub fn has_key(&self, key: &Key) -> bool {
        self.table == key.table && self.primary_key == key.primary_key
    }
}

/// An operation's observable effect. Immutable once ingested.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub operation_id: OperationId,
    pub transaction_id: TransactionId,
    pub thread_id: u64,
    pub kind: OperationKind,
    pub start_ts: Timestamp,
    pub finish_ts: Timestamp,
    /// Present only on `Start`.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub isolation_level: Option<IsolationLevel>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lock_mode: LockMode,
    #[cfg_attr(feature = "serde", serde(default))]
    pub read_mode: ReadMode,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Vec::is_empty")
    )]
    pub read_tuples: Vec<TupleTrace>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Vec::is_empty")
    )]
    pub write_tuples: Vec<TupleTrace>,
}

impl TraceRecord {
    #[must_use]
    pub const fn interval(&self) -> Interval {
        Interval::new(self.start_ts, self.finish_ts)
    }

    #[must_use]
    pub const fn op_ref(&self) -> OpRef {
        OpRef::new(self.transaction_id, self.operation_id)
    }

    /// `true` if any tuple read or written by `self` has the given key.
    #[must_use]
    pub fn touches(&self, key: &Key) -> bool {
        self.read_tuples
            .iter()
            .chain(&self.write_tuples)
            .any(|tuple| tuple.has_key(key))
    }

    /// First key touched by both operations, if any.
    #[must_use]
    pub fn common_key(&self, other: &Self) -> Option<Key> {
        self.read_tuples
            .iter()
            .chain(&self.write_tuples)
            .find(|tuple| other.touches(&tuple.key()))
            .map(TupleTrace::key)
    }
}

impl Display for TraceRecord {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(
            f,
            "{}{} {:?} {}",
            self.transaction_id,
            self.operation_id,
            self.kind,
            self.interval()
        )
    }
}

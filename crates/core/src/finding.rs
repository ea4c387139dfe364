//! Anomalies found in a trace, each with enough context to stand on its own
//! as a certificate.

use alloc::vec::Vec;
use core::fmt::{Display, Formatter};

use crate::graph::CycleEdge;
use crate::profile::Snapshot;
use crate::trace::{Interval, Key, OpRef, TraceRecord, Values};
use crate::version::Version;

/// Two operations held conflicting locks on the same key at the same time.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockViolation {
    pub key: Key,
    pub holder: TraceRecord,
    /// When the holder's transaction released its locks.
    pub holder_release: Option<Interval>,
    pub contender: TraceRecord,
}

/// A transaction did not read its own latest write.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSelfViolation {
    pub key: Key,
    pub read: TraceRecord,
    pub observed: Values,
    pub expected: Version,
}

/// A read observed a value no admissible version holds.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOtherViolation {
    pub key: Key,
    pub read: TraceRecord,
    pub observed: Values,
    pub snapshot: Interval,
    pub candidates: Vec<Version>,
    /// The whole chain at the time of the read, newest first.
    pub chain: Vec<Version>,
}

/// A snapshot transaction overwrote a version committed after its snapshot.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeAccessViolation {
    pub key: Key,
    pub write: TraceRecord,
    pub snapshot: Snapshot,
    pub conflicting: Version,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    RecordLockError(LockViolation),
    PredicateLockError(LockViolation),
    ReadSelfError(ReadSelfViolation),
    ReadOtherError(ReadOtherViolation),
    SerializeAccessError(SerializeAccessViolation),
    DependencyCycleError { edges: Vec<CycleEdge> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingKind {
    RecordLock,
    PredicateLock,
    ReadSelf,
    ReadOther,
    SerializeAccess,
    DependencyCycle,
}

impl FindingKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RecordLock => "RecordLockError",
            Self::PredicateLock => "PredicateLockError",
            Self::ReadSelf => "ReadSelfError",
            Self::ReadOther => "ReadOtherError",
            Self::SerializeAccess => "SerializeAccessError",
            Self::DependencyCycle => "DependencyCycleError",
        }
    }
}

impl Finding {
    #[must_use]
    pub const fn kind(&self) -> FindingKind {
        match self {
            Self::RecordLockError(_) => FindingKind::RecordLock,
            Self::PredicateLockError(_) => FindingKind::PredicateLock,
            Self::ReadSelfError(_) => FindingKind::ReadSelf,
            Self::ReadOtherError(_) => FindingKind::ReadOther,
            Self::SerializeAccessError(_) => FindingKind::SerializeAccess,
            Self::DependencyCycleError { .. } => FindingKind::DependencyCycle,
        }
    }

    /// The operation the finding is reported against.
    #[must_use]
    pub fn culprit(&self) -> Option<OpRef> {
        match self {
            Self::RecordLockError(v) | Self::PredicateLockError(v) => Some(v.contender.op_ref()),
            Self::ReadSelfError(v) => Some(v.read.op_ref()),
            Self::ReadOtherError(v) => Some(v.read.op_ref()),
            Self::SerializeAccessError(v) => Some(v.write.op_ref()),
            Self::DependencyCycleError { edges } => edges
                .first()
                .and_then(|edge| edge.evidence.first())
                .map(|dependency| dependency.to),
        }
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RecordLockError(v) | Self::PredicateLockError(v) => write!(
                f,
                "{}: {} and {} both locked {}",
                self.kind().name(),
                v.holder,
                v.contender,
                v.key
            ),
            Self::ReadSelfError(v) => write!(
                f,
                "ReadSelfError: {} missed its own write of {}",
                v.read, v.key
            ),
            Self::ReadOtherError(v) => write!(
                f,
                "ReadOtherError: {} read {} from none of {} candidates",
                v.read,
                v.key,
                v.candidates.len()
            ),
            Self::SerializeAccessError(v) => write!(
                f,
                "SerializeAccessError: {} overwrote {} committed by {} after its snapshot",
                v.write, v.key, v.conflicting.owner
            ),
            Self::DependencyCycleError { edges } => {
                f.write_str("DependencyCycleError:")?;
                for edge in edges {
                    let tags: Vec<_> = edge.tags.iter().map(ToString::to_string).collect();
                    write!(f, " {} -{}->", edge.from, tags.join("|"))?;
                }
                if let Some(first) = edges.first() {
                    write!(f, " {}", first.from)?;
                }
                Ok(())
            }
        }
    }
}

/// Why one operation must have happened before another.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingReason {
    /// The earlier lock holder got the lock first.
    LockOrder,
    /// The contender could only proceed after the holder's transaction ended.
    LockRelease,
    /// A version visible to the snapshot was committed before it was taken.
    SnapshotOrder,
    /// A write blocked on a concurrently committing version.
    WriteOrder,
}

/// An ordering between overlapping operations implied by the checks, for
/// downstream replay of the trace.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderingDependency {
    pub before: OpRef,
    pub after: OpRef,
    pub reason: OrderingReason,
}

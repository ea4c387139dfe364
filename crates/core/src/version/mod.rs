//! Multi-version model of every key the trace touches.
//!
//! The engine cannot see the database's own version store, so it rebuilds
//! one: each write produces a [`Version`] carrying the interval during which
//! the write took effect. Committed and rolled-back transactions add a final
//! version whose interval is the terminal operation's. Versions live in a
//! [`VersionArena`]; chains and write-sets refer to them by [`VersionId`].

mod candidate;
mod chain;
mod store;

use alloc::vec::Vec;
use core::fmt::{Display, Formatter};

use hashbrown::HashMap;

pub use candidate::{CandidateSet, SearchMode, candidate_read_set};
pub use chain::VersionChain;
pub use store::{GarbageReport, ReadRegistration, VersionStore};

use crate::trace::{
    Interval, Key, OpRef, OperationId, OperationKind, TransactionId, Values,
};

/// Owner of the initial version of every key.
pub const INITIAL_OWNER: TransactionId = TransactionId(0);

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(pub u64);

impl Display for VersionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionStatus {
    Uncommitted,
    Committed,
    Rollback,
    /// The state of the key before the trace began.
    Initial,
}

/// Row contents a version holds.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowImage {
    /// Not known yet; bound by the first read that matches it.
    Unknown,
    /// The row does not exist.
    Absent,
    Present(Values),
}

impl RowImage {
    /// `true` if a read observing `observed` could have seen this image.
    ///
    /// Only the columns the read reports are compared. Observing no columns
    /// means observing the row's absence.
    #[must_use]
    pub fn matches(&self, observed: &Values) -> bool {
        match self {
            Self::Unknown => true,
            Self::Absent => observed.is_empty(),
            Self::Present(values) => {
                !observed.is_empty()
                    && observed
                        .iter()
                        .all(|(column, value)| values.get(column).is_none_or(|v| v == value))
            }
        }
    }

    /// The image after a write of `kind` with `written` columns lands on top
    /// of `self`.
    #[must_use]
    pub fn apply(&self, kind: OperationKind, written: &Values) -> Self {
        match kind {
            OperationKind::Delete => Self::Absent,
            OperationKind::Update => match self {
                Self::Present(values) => {
                    let mut values = values.clone();
                    values.extend(written.iter().map(|(c, v)| (c.clone(), v.clone())));
                    Self::Present(values)
                }
                Self::Unknown | Self::Absent => Self::Present(written.clone()),
            },
            _ => Self::Present(written.clone()),
        }
    }
}

/// One state of one key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    pub key: Key,
    pub owner: TransactionId,
    /// The write that produced it, or the terminal operation for final versions.
    pub operation: OperationId,
    pub interval: Interval,
    pub image: RowImage,
    pub status: VersionStatus,
    /// `Insert` when the owner created the row, even through later updates.
    pub producer: OperationKind,
    /// The transaction whose committed version immediately follows this one.
    pub successor: Option<OpRef>,
    /// Adjacent-pair write-write inference has been done for this version.
    pub ww_checked: bool,
    pub readers: Vec<OpRef>,
}

impl Version {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(
            self.status,
            VersionStatus::Committed | VersionStatus::Initial
        )
    }

    #[must_use]
    pub const fn op_ref(&self) -> OpRef {
        OpRef::new(self.owner, self.operation)
    }

    #[must_use]
    pub fn matches(&self, observed: &Values) -> bool {
        self.image.matches(observed)
    }
}

/// Owning storage of all live versions.
#[derive(Debug, Default)]
pub struct VersionArena {
    slots: HashMap<VersionId, Version>,
    next: u64,
}

impl VersionArena {
    pub fn next_id(&mut self) -> VersionId {
        self.next += 1;
        VersionId(self.next)
    }

    pub fn insert(&mut self, version: Version) -> VersionId {
        let id = version.id;
        self.slots.insert(id, version);
        id
    }

    #[must_use]
    pub fn get(&self, id: VersionId) -> Option<&Version> {
        self.slots.get(&id)
    }

    pub fn get_mut(&mut self, id: VersionId) -> Option<&mut Version> {
        self.slots.get_mut(&id)
    }

    pub fn remove(&mut self, id: VersionId) -> Option<Version> {
        self.slots.remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

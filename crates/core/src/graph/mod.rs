//! Transaction dependency graph.
//!
//! Vertices are transactions, edges are inferred write-write, write-read and
//! read-write dependencies. A short cycle among them means no serial order
//! explains what the trace observed.

mod cycle;
mod dependency;

use alloc::collections::BTreeSet;
use core::fmt::{Display, Formatter};

pub use cycle::{bounded_circuits, strongly_connected_component};
pub use dependency::{CycleEdge, DependencyGraph, EdgeOutcome, Vertex};

use crate::trace::{Key, OpRef, Timestamp, TransactionId};

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    /// `from` installed a version `to` overwrote.
    WW,
    /// `to` read a version `from` installed.
    WR,
    /// `from` read a version `to` overwrote.
    RW,
}

impl Display for DependencyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::WW => "ww",
            Self::WR => "wr",
            Self::RW => "rw",
        };
        f.write_str(name)
    }
}

/// Evidence for one inferred edge.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub from: OpRef,
    pub to: OpRef,
    pub key: Key,
}

impl Dependency {
    #[must_use]
    pub const fn new(kind: DependencyKind, from: OpRef, to: OpRef, key: Key) -> Self {
        Self {
            kind,
            from,
            to,
            key,
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} -{}-> {} on {}", self.from, self.kind, self.to, self.key)
    }
}

/// Set of dependency kinds labelling one edge.
pub type EdgeTags = BTreeSet<DependencyKind>;

/// What the graph needs to know about the rest of the engine to decide
/// whether a vertex can never again take part in a cycle.
pub trait RetentionOracle {
    /// The transaction may still produce records or be read from.
    fn is_active(&self, transaction: TransactionId) -> bool;

    /// Earliest begin time of any active transaction.
    fn earliest_active_begin(&self) -> Option<Timestamp>;

    /// Every version the transaction installed has had its write-write
    /// successor inferred.
    fn versions_settled(&self, transaction: TransactionId) -> bool;
}

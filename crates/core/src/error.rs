//! Fatal errors.
//!
//! Anomalies found in a trace are not errors; they are reported as
//! [`Finding`](crate::finding::Finding)s and the run continues. The variants
//! here mean either the input could not be read, or the engine's own model
//! became inconsistent (which points at an ordering or ingestion bug
//! upstream). Either way the run is aborted rather than producing unsound
//! findings.

use alloc::string::String;
use core::fmt::{Display, Formatter};

use derive_more::From;

use crate::trace::{Key, OperationId, Timestamp, TransactionId};

#[derive(Debug, From)]
pub enum Error {
    /// A transactional record arrived for a transaction whose `Start` was never seen.
    MissingProfile {
        transaction: TransactionId,
        operation: OperationId,
    },
    /// Two `Start` records for the same transaction.
    DuplicateStart { transaction: TransactionId },
    /// A second `Commit`/`Rollback` for an already finished transaction.
    UnknownTransactionEnd {
        transaction: TransactionId,
        operation: OperationId,
    },
    /// A version the write-sets claim to hold is gone from its chain.
    MissingWriteSetEntry {
        transaction: TransactionId,
        key: Key,
    },
    /// A source handed out records out of start-time order.
    UnorderedSource {
        source: usize,
        previous: Timestamp,
        next: Timestamp,
    },
    #[from]
    Io(std::io::Error),
    #[cfg(feature = "serde")]
    #[from]
    Decode(serde_json::Error),
    #[from]
    ThreadPool(rayon::ThreadPoolBuildError),
    /// Free-form invariant violation with a description.
    Invariant(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingProfile {
                transaction,
                operation,
            } => write!(f, "operation {operation} belongs to unknown transaction {transaction}"),
            Self::DuplicateStart { transaction } => {
                write!(f, "transaction {transaction} started twice")
            }
            Self::UnknownTransactionEnd {
                transaction,
                operation,
            } => write!(
                f,
                "operation {operation} ends transaction {transaction} which is not active"
            ),
            Self::MissingWriteSetEntry { transaction, key } => write!(
                f,
                "write-set of {transaction} references a missing version of {key}"
            ),
            Self::UnorderedSource {
                source,
                previous,
                next,
            } => write!(
                f,
                "source {source} is not ordered by start time ({next} after {previous})"
            ),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            #[cfg(feature = "serde")]
            Self::Decode(e) => write!(f, "malformed trace record: {e}"),
            Self::ThreadPool(e) => write!(f, "cannot build merge pool: {e}"),
            Self::Invariant(message) => write!(f, "model invariant violated: {message}"),
        }
    }
}

impl std::error::Error for Error {}

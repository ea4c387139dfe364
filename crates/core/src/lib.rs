//! Black-box isolation checking of recorded database traces.
//!
//! `tracecop_core` consumes the operations a set of client threads issued
//! against a database, each with the client-observed start and finish time
//! and the rows it read and wrote, and reports every place where the
//! observations cannot be explained by the isolation level the transaction
//! asked for.
//!
//! The engine streams the trace instead of loading it whole:
//!
//! 1. A [`GlobalOrderer`](orderer::GlobalOrderer) merges the per-thread
//!    sources into one start-time order and computes the *cordon line*, the
//!    point before which nothing new can still arrive.
//! 2. Records enter an [`AnalysisWindow`](window::AnalysisWindow). Their
//!    writes become [`Version`](version::Version)s on per-key chains, and
//!    transaction lifetimes become [`Profile`](profile::Profile)s.
//! 3. Once the head of the window has enough context, three checkers look
//!    at it:
//!    - [`MutualExclusion`](checker::MutualExclusion): conflicting locks
//!      must not be held at the same time;
//!    - [`ReadConsistency`](checker::ReadConsistency): every read must
//!      match a version it was allowed to see;
//!    - [`FirstUpdaterWins`](checker::FirstUpdaterWins): snapshot
//!      transactions must not overwrite concurrent commits.
//! 4. Read-from and version-order facts become `ww`/`wr`/`rw` edges of a
//!    [`DependencyGraph`](graph::DependencyGraph), which is searched for
//!    short cycles as each edge arrives.
//!
//! Versions, profiles and graph vertices that can no longer affect any
//! verdict are collected as the run advances, so memory tracks the amount of
//! concurrency in the trace rather than its length.
//!
//! # Entry point
//!
//! ```rust,ignore
//! use tracecop_core::{check, AnalysisConfig, VecSource};
//!
//! let report = check(AnalysisConfig::default(), vec![VecSource::new(records)])?;
//! for finding in &report.findings {
//!     println!("{finding}");
//! }
//! ```
//!
//! # Crate features
//!
//! - **`serde`** (default) -- `Serialize`/`Deserialize` on trace records,
//!   findings and the report, plus the JSON-lines trace source.
//! - **`schemars`** -- JSON schema for the trace record format.

extern crate alloc;

pub mod capability;
pub mod checker;
pub mod config;
pub mod context;
pub mod error;
pub mod finding;
pub mod graph;
pub mod orderer;
pub mod profile;
pub mod source;
pub mod stats;
pub mod trace;
pub mod version;
pub mod window;

pub use capability::Capabilities;
pub use config::AnalysisConfig;
pub use context::{check, AnalysisContext, Report};
pub use error::Error;
pub use finding::{Finding, FindingKind};
#[cfg(feature = "serde")]
pub use source::JsonLinesSource;
pub use source::{TraceSource, VecSource};
pub use trace::{
    IsolationLevel, Key, LockMode, OperationId, OperationKind, ReadMode, TraceRecord,
    TransactionId, TupleTrace,
};

//! Per-record checks run when a record reaches the head of the window.
//!
//! Checkers only look at the engine's state; whatever they conclude comes
//! back as a [`CheckOutcome`] that the engine applies afterwards. This keeps
//! them free to run side by side.

mod first_updater_wins;
mod mutual_exclusion;
mod read_consistency;

use alloc::vec::Vec;
use std::time::{Duration, Instant};

pub use first_updater_wins::FirstUpdaterWins;
pub use mutual_exclusion::MutualExclusion;
pub use read_consistency::ReadConsistency;

use crate::capability::Capabilities;
use crate::finding::{Finding, OrderingDependency};
use crate::profile::Profile;
use crate::trace::{Key, OpRef, TraceRecord, Values};
use crate::version::{VersionId, VersionStore};
use crate::window::AnalysisWindow;

/// Read-only view of the engine for one window head.
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub head: &'a TraceRecord,
    pub profile: &'a Profile,
    pub window: &'a AnalysisWindow,
    pub versions: &'a VersionStore,
    pub capabilities: &'a Capabilities,
}

/// A read resolved to exactly one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMatch {
    pub key: Key,
    pub version: VersionId,
    pub reader: OpRef,
    pub observed: Values,
}

#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub findings: Vec<Finding>,
    pub ordering: Vec<OrderingDependency>,
    pub reads: Vec<ReadMatch>,
    pub elapsed: Duration,
}

pub trait Checker {
    const NAME: &'static str;

    /// Whether the checker has anything to say about this head at all.
    fn applies(&self, input: &CheckInput<'_>) -> bool;

    fn check(&self, input: &CheckInput<'_>, outcome: &mut CheckOutcome);

    fn run(&self, input: &CheckInput<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        if self.applies(input) {
            let started = Instant::now();
            self.check(input, &mut outcome);
            outcome.elapsed = started.elapsed();
        }
        outcome
    }
}

/// Outcomes of the three checkers, in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct HeadOutcome {
    pub mutual_exclusion: CheckOutcome,
    pub read_consistency: CheckOutcome,
    pub first_updater_wins: CheckOutcome,
}

impl HeadOutcome {
    pub fn into_named(self) -> [(&'static str, CheckOutcome); 3] {
        [
            (MutualExclusion::NAME, self.mutual_exclusion),
            (ReadConsistency::NAME, self.read_consistency),
            (FirstUpdaterWins::NAME, self.first_updater_wins),
        ]
    }
}

/// Runs every checker on the head, on the rayon pool when `parallel`.
#[must_use]
pub fn check_head(input: &CheckInput<'_>, parallel: bool) -> HeadOutcome {
    if parallel {
        let (mutual_exclusion, (read_consistency, first_updater_wins)) = rayon::join(
            || MutualExclusion.run(input),
            || {
                rayon::join(
                    || ReadConsistency.run(input),
                    || FirstUpdaterWins.run(input),
                )
            },
        );
        HeadOutcome {
            mutual_exclusion,
            read_consistency,
            first_updater_wins,
        }
    } else {
        HeadOutcome {
            mutual_exclusion: MutualExclusion.run(input),
            read_consistency: ReadConsistency.run(input),
            first_updater_wins: FirstUpdaterWins.run(input),
        }
    }
}

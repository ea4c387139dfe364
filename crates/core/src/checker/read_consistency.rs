use alloc::vec::Vec;

use super::{CheckInput, CheckOutcome, Checker, ReadMatch};
use crate::finding::{Finding, ReadOtherViolation, ReadSelfViolation};
use crate::trace::{Interval, ReadMode, TupleTrace};

/// Every read must be explained by some version it was allowed to see.
///
/// A transaction reads its own latest write if it has one. Otherwise the
/// observed values must match a version in the candidate read set of the
/// read's snapshot: the transaction's snapshot for consistent reads at a
/// snapshot isolation level, the read's own interval for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadConsistency;

impl ReadConsistency {
    fn snapshot(input: &CheckInput<'_>) -> Interval {
        let head = input.head;
        let profile = input.profile;
        match profile.snapshot {
            Some(snapshot)
                if head.read_mode == ReadMode::ConsistentRead
                    && input
                        .capabilities
                        .uses_transaction_snapshot(profile.isolation_level) =>
            {
                snapshot.interval
            }
            _ => head.interval(),
        }
    }

    fn check_tuple(
        input: &CheckInput<'_>,
        tuple: &TupleTrace,
        snapshot: Interval,
        outcome: &mut CheckOutcome,
    ) {
        let head = input.head;
        let key = tuple.key();
        let observed = &tuple.observed_values;

        if let Some(own) = input.versions.own_write(head.transaction_id, &key) {
            if !own.matches(observed) {
                tracing::debug!(read = %head, %key, "read missed own write");
                outcome.findings.push(Finding::ReadSelfError(ReadSelfViolation {
                    key,
                    read: head.clone(),
                    observed: observed.clone(),
                    expected: own.clone(),
                }));
            }
            return;
        }

        let include_uncommitted = head.read_mode == ReadMode::UncommittedRead;
        let set = input
            .versions
            .candidate_read_set(&key, snapshot, include_uncommitted);
        let candidates: Vec<_> = set
            .candidates
            .iter()
            .filter_map(|id| input.versions.version(*id))
            .collect();
        let mut matching = candidates.iter().filter(|version| version.matches(observed));

        match (matching.next(), matching.next()) {
            (None, _) => {
                tracing::debug!(read = %head, %key, candidates = candidates.len(), "no candidate matches");
                outcome.findings.push(Finding::ReadOtherError(ReadOtherViolation {
                    key: key.clone(),
                    read: head.clone(),
                    observed: observed.clone(),
                    snapshot,
                    candidates: candidates.iter().map(|&v| v.clone()).collect(),
                    chain: input.versions.versions(&key).cloned().collect(),
                }));
            }
            (Some(version), None) => outcome.reads.push(ReadMatch {
                key,
                version: version.id,
                reader: head.op_ref(),
                observed: observed.clone(),
            }),
            (Some(_), Some(_)) => {
                tracing::trace!(read = %head, %key, "ambiguous read");
            }
        }
    }
}

impl Checker for ReadConsistency {
    const NAME: &'static str = "read_consistency";

    fn applies(&self, input: &CheckInput<'_>) -> bool {
        input.head.kind.is_data() && !input.head.read_tuples.is_empty()
    }

    fn check(&self, input: &CheckInput<'_>, outcome: &mut CheckOutcome) {
        let snapshot = Self::snapshot(input);
        for tuple in &input.head.read_tuples {
            Self::check_tuple(input, tuple, snapshot, outcome);
        }
    }
}

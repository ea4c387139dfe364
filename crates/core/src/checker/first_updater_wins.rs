use super::{CheckInput, CheckOutcome, Checker};
use crate::finding::{Finding, OrderingDependency, OrderingReason, SerializeAccessViolation};
use crate::trace::OpRef;
use crate::version::VersionStatus;

/// Under snapshot isolation, a transaction may not overwrite a key that
/// another transaction committed after the snapshot was taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstUpdaterWins;

impl Checker for FirstUpdaterWins {
    const NAME: &'static str = "first_updater_wins";

    fn applies(&self, input: &CheckInput<'_>) -> bool {
        input.head.kind.is_write()
            && input.profile.uses_consistent_read
            && input.profile.snapshot.is_some()
            && input
                .capabilities
                .enforces_first_updater_wins(input.profile.isolation_level)
    }

    fn check(&self, input: &CheckInput<'_>, outcome: &mut CheckOutcome) {
        let head = input.head;
        let Some(snapshot) = input.profile.snapshot else {
            return;
        };
        let written = head.interval();
        let snapshot_op = OpRef::new(head.transaction_id, snapshot.operation);

        for tuple in &head.write_tuples {
            let key = tuple.key();
            let mut reported = false;
            for version in input.versions.versions(&key) {
                if version.status != VersionStatus::Committed
                    || version.owner == head.transaction_id
                {
                    continue;
                }
                if version.interval.overlaps(&snapshot.interval) {
                    outcome.ordering.push(OrderingDependency {
                        before: version.op_ref(),
                        after: snapshot_op,
                        reason: OrderingReason::SnapshotOrder,
                    });
                }
                if version.interval.overlaps(&written) {
                    outcome.ordering.push(OrderingDependency {
                        before: head.op_ref(),
                        after: version.op_ref(),
                        reason: OrderingReason::WriteOrder,
                    });
                }
                if !reported
                    && snapshot.interval.precedes(&version.interval)
                    && version.interval.precedes(&written)
                {
                    tracing::debug!(write = %head, %key, committer = %version.owner, "first updater lost");
                    outcome
                        .findings
                        .push(Finding::SerializeAccessError(SerializeAccessViolation {
                            key: key.clone(),
                            write: head.clone(),
                            snapshot,
                            conflicting: version.clone(),
                        }));
                    reported = true;
                }
            }
        }
    }
}

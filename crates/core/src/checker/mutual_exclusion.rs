use super::{CheckInput, CheckOutcome, Checker};
use crate::finding::{Finding, LockViolation, OrderingDependency, OrderingReason};
use crate::trace::{LockMode, OperationKind, Timestamp};

/// Conflicting locks on a common key must never be held at once.
///
/// A lock taken by the head is held until its transaction ends. A later
/// operation of another transaction that requests a conflicting lock on the
/// same key, starts after the head finished and completes before the head's
/// transaction began to end, cannot have waited for the release.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutualExclusion;

impl Checker for MutualExclusion {
    const NAME: &'static str = "mutual_exclusion";

    fn applies(&self, input: &CheckInput<'_>) -> bool {
        input.head.kind.is_data() && input.head.lock_mode != LockMode::NonLock
    }

    fn check(&self, input: &CheckInput<'_>, outcome: &mut CheckOutcome) {
        let head = input.head;
        let terminal = input.profile.terminal();
        let release_by = terminal.map_or(Timestamp::MAX, |(end, _)| end.finish);

        for next in input.window.ahead() {
            if next.start_ts >= release_by {
                break;
            }
            if next.transaction_id == head.transaction_id
                || !next.kind.is_data()
                || !head.lock_mode.conflicts_with(next.lock_mode)
            {
                continue;
            }
            let Some(key) = head.common_key(next) else {
                continue;
            };

            if head.interval().overlaps(&next.interval()) {
                outcome.ordering.push(OrderingDependency {
                    before: head.op_ref(),
                    after: next.op_ref(),
                    reason: OrderingReason::LockOrder,
                });
            }
            if let Some((end, op)) = terminal {
                if end.overlaps(&next.interval()) {
                    outcome.ordering.push(OrderingDependency {
                        before: op,
                        after: next.op_ref(),
                        reason: OrderingReason::LockRelease,
                    });
                }
            }

            let released_before = terminal.map_or(Timestamp::MAX, |(end, _)| end.start);
            if head.interval().precedes(&next.interval()) && next.finish_ts <= released_before {
                let violation = LockViolation {
                    key,
                    holder: head.clone(),
                    holder_release: terminal.map(|(end, _)| end),
                    contender: next.clone(),
                };
                tracing::debug!(holder = %head, contender = %next, "lock conflict");
                outcome.findings.push(
                    if head.kind == OperationKind::Insert || next.kind == OperationKind::Insert {
                        Finding::PredicateLockError(violation)
                    } else {
                        Finding::RecordLockError(violation)
                    },
                );
            }
        }
    }
}

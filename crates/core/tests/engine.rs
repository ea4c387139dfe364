mod common;

use common::{
    commit, context, op, rollback, run, select, select_for_update, serial_increments, start,
    write,
};
use tracecop_core::trace::{Interval, IsolationLevel, LockMode, ReadMode};
use tracecop_core::{AnalysisConfig, Capabilities, Finding, FindingKind, Key, OperationKind};

const RR: IsolationLevel = IsolationLevel::RepeatableRead;
const RC: IsolationLevel = IsolationLevel::ReadCommitted;

fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
    findings.iter().map(Finding::kind).collect()
}

/// T2 reads `x` while T1's update is still uncommitted: the initial row is
/// the only version T2 could have seen.
#[test]
fn concurrent_uncommitted_write_is_invisible() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![
        vec![
            start(1, 1, 1, RR),
            write(1, 2, OperationKind::Update, 3, row!(t/x { v: 1 })),
            commit(1, 3, 10),
        ],
        vec![
            start(2, 4, 2, RR),
            select(2, 5, 5, row!(t/x { v: 0 })),
            commit(2, 6, 7),
        ],
    ];
    let config = AnalysisConfig::builder().garbage_collection(false).build();
    let mut ctx = context(config, &seed, threads);
    while ctx.step().unwrap() {}

    let key = Key::new("t", "x");
    let initial = ctx.versions().chain(&key).and_then(|chain| chain.initial());
    let set = ctx
        .versions()
        .candidate_read_set(&key, Interval::new(5, 6), false);
    assert_eq!(set.candidates, initial.into_iter().collect::<Vec<_>>());

    let report = ctx.finish();
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.statistics.rw, 1);
    assert_eq!(report.statistics.wr, 0);
    assert_eq!(report.statistics.ww, 0);
}

/// T1 reads `k` at 5 under a snapshot of [0, 5) while T2 writes it at 6 and
/// commits at 8: only the initial row was visible.
#[test]
fn snapshot_sees_only_the_initial_row() {
    let seed = [row!(t/k { v: "x" })];
    let threads = vec![
        vec![
            start(1, 1, 0, RR),
            select(1, 2, 5, row!(t/k { v: "x" })),
            commit(1, 3, 10),
        ],
        vec![
            start(2, 4, 2, RR),
            write(2, 5, OperationKind::Update, 6, row!(t/k { v: "y" })),
            commit(2, 6, 8),
        ],
    ];
    let config = AnalysisConfig::builder().garbage_collection(false).build();
    let mut ctx = context(config, &seed, threads);
    while ctx.step().unwrap() {}

    let key = Key::new("t", "k");
    let initial = ctx.versions().chain(&key).and_then(|chain| chain.initial());
    let set = ctx
        .versions()
        .candidate_read_set(&key, Interval::new(0, 5), false);
    assert_eq!(set.candidates, initial.into_iter().collect::<Vec<_>>());

    let report = ctx.finish();
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.statistics.rw, 1);
    assert_eq!(report.statistics.wr, 0);
}

#[test]
fn reading_an_insert_later_deleted_is_fine() {
    let threads = vec![vec![
        start(1, 1, 1, RR),
        write(1, 2, OperationKind::Insert, 3, row!(t/x { v: 1 })),
        select(1, 3, 5, row!(t/x { v: 1 })),
        write(1, 4, OperationKind::Delete, 7, row!(t/x)),
        commit(1, 5, 9),
    ]];
    let report = run(AnalysisConfig::default(), &[], threads);
    assert!(report.is_clean(), "{:?}", report.findings);
}

#[test]
fn reading_an_updated_insert_later_deleted_is_fine() {
    let threads = vec![vec![
        start(1, 1, 1, RR),
        write(1, 2, OperationKind::Insert, 3, row!(t/x { v: 1 })),
        write(1, 3, OperationKind::Update, 5, row!(t/x { v: 2 })),
        select(1, 4, 7, row!(t/x { v: 2 })),
        write(1, 5, OperationKind::Delete, 9, row!(t/x)),
        select(1, 6, 11, row!(t/x)),
        commit(1, 7, 13),
    ]];
    let report = run(AnalysisConfig::default(), &[], threads);
    assert!(report.is_clean(), "{:?}", report.findings);
}

#[test]
fn missed_own_write_is_read_self_error() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![vec![
        start(1, 1, 1, RC),
        write(1, 2, OperationKind::Update, 3, row!(t/x { v: 1 })),
        select(1, 3, 5, row!(t/x { v: 0 })),
        commit(1, 4, 7),
    ]];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert_eq!(kinds(&report.findings), [FindingKind::ReadSelf]);
    assert_eq!(report.statistics.read_self_errors, 1);
}

#[test]
fn value_nobody_wrote_is_read_other_error() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![vec![
        start(1, 1, 1, RC),
        write(1, 2, OperationKind::Update, 3, row!(t/x { v: 1 })),
        commit(1, 3, 7),
        start(2, 4, 10, RC),
        select(2, 5, 12, row!(t/x { v: 7 })),
        commit(2, 6, 14),
    ]];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert_eq!(kinds(&report.findings), [FindingKind::ReadOther]);
    let Finding::ReadOtherError(violation) = &report.findings[0] else {
        unreachable!()
    };
    assert_eq!(violation.candidates.len(), 1);
    assert_eq!(violation.candidates[0].owner.0, 1);
}

#[test]
fn overlapping_select_for_update_is_record_lock_error() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![
        vec![
            start(1, 1, 1, RC),
            select_for_update(1, 2, 3, row!(t/x { v: 0 })),
            commit(1, 3, 20),
        ],
        vec![
            start(2, 4, 5, RC),
            select_for_update(2, 5, 7, row!(t/x { v: 0 })),
            commit(2, 6, 9),
        ],
    ];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert_eq!(kinds(&report.findings), [FindingKind::RecordLock]);
    let Finding::RecordLockError(violation) = &report.findings[0] else {
        unreachable!()
    };
    assert_eq!(violation.holder.transaction_id.0, 1);
    assert_eq!(violation.contender.transaction_id.0, 2);
}

#[test]
fn waiting_for_the_release_is_fine() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![
        vec![
            start(1, 1, 1, RC),
            select_for_update(1, 2, 3, row!(t/x { v: 0 })),
            commit(1, 3, 6),
        ],
        vec![
            start(2, 4, 2, RC),
            // blocked until T1 released its lock
            op(2, 5, OperationKind::Select, 4, 8)
                .lock(LockMode::ExclusiveLock)
                .read_mode(ReadMode::LockingRead)
                .reads([row!(t/x { v: 0 })])
                .done(),
            commit(2, 6, 12),
        ],
    ];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert!(report.is_clean(), "{:?}", report.findings);
}

#[test]
fn concurrent_inserts_are_predicate_lock_error() {
    let threads = vec![
        vec![
            start(1, 1, 1, RC),
            write(1, 2, OperationKind::Insert, 3, row!(t/y { v: 1 })),
            commit(1, 3, 20),
        ],
        vec![
            start(2, 4, 5, RC),
            write(2, 5, OperationKind::Insert, 7, row!(t/y { v: 2 })),
            commit(2, 6, 9),
        ],
    ];
    let report = run(AnalysisConfig::default(), &[], threads);
    assert_eq!(kinds(&report.findings), [FindingKind::PredicateLock]);
}

/// T1 reads `x` from its snapshot, T2 commits an update of `x`, then T1
/// updates `x` as well.
fn lost_update() -> Vec<Vec<tracecop_core::TraceRecord>> {
    vec![
        vec![
            start(1, 1, 1, RR),
            select(1, 2, 3, row!(t/x { v: 0 })),
            write(1, 3, OperationKind::Update, 20, row!(t/x { v: 1 })),
            commit(1, 4, 22),
        ],
        vec![
            start(2, 5, 5, RR),
            write(2, 6, OperationKind::Update, 7, row!(t/x { v: 2 })),
            commit(2, 7, 9),
        ],
    ]
}

#[test]
fn lost_update_violates_first_updater_wins_on_postgresql() {
    let config = AnalysisConfig::builder()
        .capabilities(Capabilities::postgresql())
        .verify_cycles(false)
        .build();
    let report = run(config, &[row!(t/x { v: 0 })], lost_update());
    assert_eq!(kinds(&report.findings), [FindingKind::SerializeAccess]);
    let Finding::SerializeAccessError(violation) = &report.findings[0] else {
        unreachable!()
    };
    assert_eq!(violation.write.transaction_id.0, 1);
    assert_eq!(violation.conflicting.owner.0, 2);
}

#[test]
fn lost_update_closes_a_dependency_cycle() {
    let report = run(AnalysisConfig::default(), &[row!(t/x { v: 0 })], lost_update());
    assert_eq!(kinds(&report.findings), [FindingKind::DependencyCycle]);
    let Finding::DependencyCycleError { edges } = &report.findings[0] else {
        unreachable!()
    };
    assert_eq!(edges.len(), 2);
    assert_eq!(report.statistics.ww, 1);
    assert_eq!(report.statistics.rw, 1);
}

#[test]
fn disabled_rw_inference_hides_the_cycle() {
    let config = AnalysisConfig::builder()
        .dependencies(tracecop_core::config::DependencyToggles {
            ww: true,
            wr: true,
            rw: false,
        })
        .build();
    let report = run(config, &[row!(t/x { v: 0 })], lost_update());
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.statistics.rw, 0);
}

#[test]
fn serial_history_is_clean() {
    let report = run(
        AnalysisConfig::default(),
        &[row!(t/x { v: 0 })],
        vec![serial_increments(12, RR)],
    );
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.statistics.wr, 11);
    assert_eq!(report.statistics.ww, 11);
    assert_eq!(report.statistics.analyzed, 48);
}

#[test]
fn parallel_checkers_agree() {
    let sequential = run(AnalysisConfig::default(), &[row!(t/x { v: 0 })], lost_update());
    let config = AnalysisConfig::builder().parallel_checkers(true).build();
    let parallel = run(config, &[row!(t/x { v: 0 })], lost_update());
    assert_eq!(sequential.findings, parallel.findings);
}

#[test]
fn rolled_back_value_is_never_visible() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![vec![
        start(1, 1, 1, RC),
        write(1, 2, OperationKind::Update, 3, row!(t/x { v: 1 })),
        rollback(1, 3, 7),
        start(2, 4, 10, RC),
        select(2, 5, 12, row!(t/x { v: 1 })),
        commit(2, 6, 14),
    ]];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert_eq!(kinds(&report.findings), [FindingKind::ReadOther]);
}

#[test]
fn read_uncommitted_may_see_pending_writes() {
    let seed = [row!(t/x { v: 0 })];
    let threads = vec![
        vec![
            start(1, 1, 1, RC),
            write(1, 2, OperationKind::Update, 3, row!(t/x { v: 1 })),
            rollback(1, 3, 20),
        ],
        vec![
            start(2, 4, 5, IsolationLevel::ReadUncommitted),
            op(2, 5, OperationKind::Select, 7, 8)
                .read_mode(ReadMode::UncommittedRead)
                .reads([row!(t/x { v: 1 })])
                .done(),
            commit(2, 6, 9),
        ],
    ];
    let report = run(AnalysisConfig::default(), &seed, threads);
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.statistics.wr, 1);
}

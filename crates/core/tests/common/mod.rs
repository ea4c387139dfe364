#![allow(dead_code)]

use tracecop_core::trace::{IsolationLevel, LockMode, OperationId, ReadMode, TransactionId};
use tracecop_core::{
    AnalysisConfig, AnalysisContext, OperationKind, Report, TraceRecord, TupleTrace, VecSource,
};

/// Build a [`TupleTrace`] from `table/pk` and optional column values.
///
/// ```ignore
/// row!(t/x)            // no columns: the row was absent
/// row!(t/x { v: 1 })   // column `v` observed as "1"
/// ```
#[macro_export]
macro_rules! row {
    ($table:ident / $pk:ident) => {
        tracecop_core::TupleTrace::new(
            stringify!($table),
            stringify!($pk),
            Vec::<(&str, &str)>::new(),
        )
    };
    ($table:ident / $pk:ident { $($col:ident : $val:expr),+ $(,)? }) => {
        tracecop_core::TupleTrace::new(
            stringify!($table),
            stringify!($pk),
            [$((stringify!($col), $val.to_string())),+],
        )
    };
}

/// A record under construction.
pub struct Op(TraceRecord);

pub fn op(txn: u64, id: u64, kind: OperationKind, start: u64, finish: u64) -> Op {
    Op(TraceRecord {
        operation_id: OperationId(id),
        transaction_id: TransactionId(txn),
        thread_id: 0,
        kind,
        start_ts: start,
        finish_ts: finish,
        isolation_level: None,
        lock_mode: LockMode::NonLock,
        read_mode: ReadMode::ConsistentRead,
        read_tuples: Vec::new(),
        write_tuples: Vec::new(),
    })
}

impl Op {
    pub fn level(mut self, level: IsolationLevel) -> Self {
        self.0.isolation_level = Some(level);
        self
    }

    pub const fn lock(mut self, mode: LockMode) -> Self {
        self.0.lock_mode = mode;
        self
    }

    pub const fn read_mode(mut self, mode: ReadMode) -> Self {
        self.0.read_mode = mode;
        self
    }

    pub fn reads(mut self, tuples: impl IntoIterator<Item = TupleTrace>) -> Self {
        self.0.read_tuples.extend(tuples);
        self
    }

    pub fn writes(mut self, tuples: impl IntoIterator<Item = TupleTrace>) -> Self {
        self.0.write_tuples.extend(tuples);
        self
    }

    pub fn done(self) -> TraceRecord {
        self.0
    }
}

pub fn start(txn: u64, id: u64, at: u64, level: IsolationLevel) -> TraceRecord {
    op(txn, id, OperationKind::Start, at, at + 1).level(level).done()
}

pub fn commit(txn: u64, id: u64, at: u64) -> TraceRecord {
    op(txn, id, OperationKind::Commit, at, at + 1).done()
}

pub fn rollback(txn: u64, id: u64, at: u64) -> TraceRecord {
    op(txn, id, OperationKind::Rollback, at, at + 1).done()
}

/// Consistent `SELECT` of one row.
pub fn select(txn: u64, id: u64, at: u64, tuple: TupleTrace) -> TraceRecord {
    op(txn, id, OperationKind::Select, at, at + 1)
        .reads([tuple])
        .done()
}

/// `SELECT ... FOR UPDATE` of one row.
pub fn select_for_update(txn: u64, id: u64, at: u64, tuple: TupleTrace) -> TraceRecord {
    op(txn, id, OperationKind::Select, at, at + 1)
        .lock(LockMode::ExclusiveLock)
        .read_mode(ReadMode::LockingRead)
        .reads([tuple])
        .done()
}

/// A write of one row holding an exclusive lock.
pub fn write(txn: u64, id: u64, kind: OperationKind, at: u64, tuple: TupleTrace) -> TraceRecord {
    op(txn, id, kind, at, at + 1)
        .lock(LockMode::ExclusiveLock)
        .read_mode(ReadMode::LockingRead)
        .writes([tuple])
        .done()
}

pub fn context(
    config: AnalysisConfig,
    seed: &[TupleTrace],
    threads: Vec<Vec<TraceRecord>>,
) -> AnalysisContext<VecSource> {
    let sources = threads.into_iter().map(VecSource::new).collect();
    let mut ctx = AnalysisContext::new(config, sources).unwrap();
    ctx.seed_initial(seed.iter().cloned());
    ctx
}

pub fn run(config: AnalysisConfig, seed: &[TupleTrace], threads: Vec<Vec<TraceRecord>>) -> Report {
    context(config, seed, threads).run().unwrap()
}

/// `n` back-to-back transactions on one thread, each reading `t/x` and
/// bumping its column `v` by one.
pub fn serial_increments(n: u64, level: IsolationLevel) -> Vec<TraceRecord> {
    (1..=n)
        .flat_map(|i| {
            let base = 10 * i;
            [
                start(i, 4 * i, base, level),
                select(i, 4 * i + 1, base + 2, row!(t/x { v: i - 1 })),
                write(i, 4 * i + 2, OperationKind::Update, base + 4, row!(t/x { v: i })),
                commit(i, 4 * i + 3, base + 6),
            ]
        })
        .collect()
}

use std::collections::HashMap;

use chrono::{DateTime, Duration, Local};
use rand::distr::{Distribution, Uniform};
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracecop_core::trace::{
    IsolationLevel, LockMode, OperationId, ReadMode, Timestamp, TransactionId,
};
use tracecop_core::{OperationKind, TraceRecord, TupleTrace};
use typed_builder::TypedBuilder;

/// Table every generated row lives in.
pub const TABLE: &str = "t";
/// The single column of every generated row.
pub const COLUMN: &str = "v";

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct TraceParams {
    #[builder(default)]
    pub id: u64,
    pub n_thread: u64,
    pub n_key: u64,
    /// Transactions per thread.
    pub n_txn: u64,
    /// Data operations per transaction.
    pub n_op: u64,
    #[builder(default = IsolationLevel::RepeatableRead)]
    pub isolation_level: IsolationLevel,
    /// Share of transactions, in percent, that end in a rollback.
    #[builder(default)]
    pub abort_percent: u32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GeneratedTrace {
    params: TraceParams,
    info: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    initial: Vec<TupleTrace>,
    threads: Vec<Vec<TraceRecord>>,
}

impl GeneratedTrace {
    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_params(&self) -> &TraceParams {
        &self.params
    }

    /// Contents of every row before the first transaction.
    #[must_use]
    pub fn get_initial(&self) -> &[TupleTrace] {
        &self.initial
    }

    /// One start-ordered record stream per client thread.
    #[must_use]
    pub fn get_threads(&self) -> &[Vec<TraceRecord>] {
        &self.threads
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<TupleTrace>, Vec<Vec<TraceRecord>>) {
        (self.initial, self.threads)
    }
}

fn row(key: u64, value: u64) -> TupleTrace {
    TupleTrace::new(TABLE, key.to_string(), [(COLUMN, value.to_string())])
}

/// Hands out operation ids and non-overlapping intervals.
#[derive(Debug)]
struct Clock {
    now: Timestamp,
    next_op: u64,
}

impl Clock {
    fn record(&mut self, thread: u64, transaction: TransactionId, kind: OperationKind) -> TraceRecord {
        let start_ts = self.now;
        self.now += 2;
        self.next_op += 1;
        TraceRecord {
            operation_id: OperationId(self.next_op),
            transaction_id: transaction,
            thread_id: thread,
            kind,
            start_ts,
            finish_ts: start_ts + 1,
            isolation_level: None,
            lock_mode: if kind.is_write() {
                LockMode::ExclusiveLock
            } else {
                LockMode::NonLock
            },
            read_mode: if kind.is_write() {
                ReadMode::LockingRead
            } else {
                ReadMode::ConsistentRead
            },
            read_tuples: Vec::new(),
            write_tuples: Vec::new(),
        }
    }
}

/// Generate the initial rows and the per-thread records of one trace.
///
/// Transactions run one at a time, round-robin over the threads: the `i`-th
/// transaction of every thread runs before the `i + 1`-th of any thread.
/// Each one issues `n_op` random reads and updates over `n_key` rows and
/// then commits, or rolls back with probability `abort_percent`.
///
/// # Serial invariant
///
/// A read observes the transaction's own pending write of the row if there
/// is one, else the last committed value. Every written value is unique, so
/// each read is explained by exactly one version.
///
/// # Panics
///
/// Panics if `n_key` is zero (cannot create a uniform distribution over
/// an empty range).
#[must_use]
pub fn generate_single_trace(params: &TraceParams) -> (Vec<TupleTrace>, Vec<Vec<TraceRecord>>) {
    let mut committed: HashMap<u64, u64> = (0..params.n_key).map(|key| (key, 0)).collect();
    let mut random_generator = rand::rng();
    let key_range = Uniform::new(0, params.n_key).unwrap();
    let percent = Uniform::new(0u32, 100).unwrap();

    let initial = (0..params.n_key).map(|key| row(key, 0)).collect();
    let mut threads: Vec<Vec<TraceRecord>> = (0..params.n_thread).map(|_| Vec::new()).collect();
    let mut clock = Clock { now: 1, next_op: 0 };
    let mut next_value = 0;

    for round in 0..params.n_txn {
        for (thread, records) in (0u64..).zip(threads.iter_mut()) {
            let transaction = TransactionId(1 + round * params.n_thread + thread);
            let mut start = clock.record(thread, transaction, OperationKind::Start);
            start.isolation_level = Some(params.isolation_level);
            records.push(start);

            let mut pending: HashMap<u64, u64> = HashMap::new();
            for _ in 0..params.n_op {
                let key = key_range.sample(&mut random_generator);
                if random_generator.random::<bool>() {
                    let value = pending.get(&key).or_else(|| committed.get(&key)).copied();
                    let mut read = clock.record(thread, transaction, OperationKind::Select);
                    read.read_tuples.push(row(key, value.unwrap_or_default()));
                    records.push(read);
                } else {
                    next_value += 1;
                    pending.insert(key, next_value);
                    let mut write = clock.record(thread, transaction, OperationKind::Update);
                    write.write_tuples.push(row(key, next_value));
                    records.push(write);
                }
            }

            let aborts = percent.sample(&mut random_generator) < params.abort_percent;
            if aborts {
                records.push(clock.record(thread, transaction, OperationKind::Rollback));
            } else {
                committed.extend(pending);
                records.push(clock.record(thread, transaction, OperationKind::Commit));
            }
        }
    }

    (initial, threads)
}

#[must_use]
pub fn generate_mult_traces(n_trace: u64, params: &TraceParams) -> Vec<GeneratedTrace> {
    (0..n_trace)
        .into_par_iter()
        .map(|i_trace| {
            let start_time = Local::now();
            let (initial, threads) = generate_single_trace(params);
            let end_time = Local::now();
            GeneratedTrace {
                params: TraceParams {
                    id: i_trace,
                    ..params.clone()
                },
                info: "generated".to_string(),
                start: start_time,
                end: end_time,
                initial,
                threads,
            }
        })
        .collect()
}

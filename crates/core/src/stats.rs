//! Run statistics.
//!
//! Counters are plain atomics updated by the analysis thread and read,
//! possibly a little stale, by a background reporter. Nothing here affects
//! the result of a run.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::finding::FindingKind;
use crate::graph::DependencyKind;

/// Structure sizes sampled after each window advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub window: usize,
    pub keys: usize,
    pub versions: usize,
    pub profiles: usize,
    pub active: usize,
    pub vertices: usize,
    pub edges: usize,
}

#[derive(Debug, Default)]
pub struct Statistics {
    ingested: AtomicU64,
    analyzed: AtomicU64,
    ww: AtomicU64,
    wr: AtomicU64,
    rw: AtomicU64,
    findings: [AtomicU64; 6],
    pruned: AtomicU64,
    collected: AtomicU64,
    mutual_exclusion_ns: AtomicU64,
    read_consistency_ns: AtomicU64,
    first_updater_wins_ns: AtomicU64,
    window: AtomicU64,
    keys: AtomicU64,
    versions: AtomicU64,
    profiles: AtomicU64,
    active: AtomicU64,
    vertices: AtomicU64,
    edges: AtomicU64,
}

const fn finding_slot(kind: FindingKind) -> usize {
    match kind {
        FindingKind::RecordLock => 0,
        FindingKind::PredicateLock => 1,
        FindingKind::ReadSelf => 2,
        FindingKind::ReadOther => 3,
        FindingKind::SerializeAccess => 4,
        FindingKind::DependencyCycle => 5,
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl Statistics {
    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analyzed(&self) {
        self.analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dependency(&self, kind: DependencyKind) {
        let counter = match kind {
            DependencyKind::WW => &self.ww,
            DependencyKind::WR => &self.wr,
            DependencyKind::RW => &self.rw,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finding(&self, kind: FindingKind) {
        self.findings[finding_slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pruned(&self, n: usize) {
        self.pruned.fetch_add(as_u64(n), Ordering::Relaxed);
    }

    pub fn record_collected(&self, n: usize) {
        self.collected.fetch_add(as_u64(n), Ordering::Relaxed);
    }

    /// Adds time spent by the checker with the given name.
    pub fn record_checker_time(&self, checker: &str, elapsed: Duration) {
        let counter = match checker {
            "mutual_exclusion" => &self.mutual_exclusion_ns,
            "read_consistency" => &self.read_consistency_ns,
            "first_updater_wins" => &self.first_updater_wins_ns,
            _ => return,
        };
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        counter.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn set_footprint(&self, footprint: Footprint) {
        self.window.store(as_u64(footprint.window), Ordering::Relaxed);
        self.keys.store(as_u64(footprint.keys), Ordering::Relaxed);
        self.versions
            .store(as_u64(footprint.versions), Ordering::Relaxed);
        self.profiles
            .store(as_u64(footprint.profiles), Ordering::Relaxed);
        self.active.store(as_u64(footprint.active), Ordering::Relaxed);
        self.vertices
            .store(as_u64(footprint.vertices), Ordering::Relaxed);
        self.edges.store(as_u64(footprint.edges), Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let finding = |kind| load(&self.findings[finding_slot(kind)]);
        StatisticsSnapshot {
            ingested: load(&self.ingested),
            analyzed: load(&self.analyzed),
            ww: load(&self.ww),
            wr: load(&self.wr),
            rw: load(&self.rw),
            record_lock_errors: finding(FindingKind::RecordLock),
            predicate_lock_errors: finding(FindingKind::PredicateLock),
            read_self_errors: finding(FindingKind::ReadSelf),
            read_other_errors: finding(FindingKind::ReadOther),
            serialize_access_errors: finding(FindingKind::SerializeAccess),
            dependency_cycle_errors: finding(FindingKind::DependencyCycle),
            pruned_vertices: load(&self.pruned),
            collected_versions: load(&self.collected),
            mutual_exclusion_ns: load(&self.mutual_exclusion_ns),
            read_consistency_ns: load(&self.read_consistency_ns),
            first_updater_wins_ns: load(&self.first_updater_wins_ns),
            window: load(&self.window),
            keys: load(&self.keys),
            versions: load(&self.versions),
            profiles: load(&self.profiles),
            active: load(&self.active),
            vertices: load(&self.vertices),
            edges: load(&self.edges),
        }
    }
}

/// Point-in-time copy of [`Statistics`].
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub ingested: u64,
    pub analyzed: u64,
    pub ww: u64,
    pub wr: u64,
    pub rw: u64,
    pub record_lock_errors: u64,
    pub predicate_lock_errors: u64,
    pub read_self_errors: u64,
    pub read_other_errors: u64,
    pub serialize_access_errors: u64,
    pub dependency_cycle_errors: u64,
    pub pruned_vertices: u64,
    pub collected_versions: u64,
    pub mutual_exclusion_ns: u64,
    pub read_consistency_ns: u64,
    pub first_updater_wins_ns: u64,
    pub window: u64,
    pub keys: u64,
    pub versions: u64,
    pub profiles: u64,
    pub active: u64,
    pub vertices: u64,
    pub edges: u64,
}

impl StatisticsSnapshot {
    #[must_use]
    pub const fn findings(&self) -> u64 {
        self.record_lock_errors
            + self.predicate_lock_errors
            + self.read_self_errors
            + self.read_other_errors
            + self.serialize_access_errors
            + self.dependency_cycle_errors
    }
}

/// Logs a statistics snapshot periodically until dropped.
#[derive(Debug)]
pub struct StatsReporter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatsReporter {
    #[must_use]
    pub fn spawn(stats: Arc<Statistics>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("tracecop-stats".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    std::thread::park_timeout(period);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    let s = stats.snapshot();
                    tracing::info!(
                        ingested = s.ingested,
                        analyzed = s.analyzed,
                        ww = s.ww,
                        wr = s.wr,
                        rw = s.rw,
                        findings = s.findings(),
                        window = s.window,
                        versions = s.versions,
                        vertices = s.vertices,
                        "progress"
                    );
                }
            })
            .map_err(|e| tracing::warn!("statistics reporter not started: {e}"))
            .ok();
        Self { stop, handle }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

//! The analysis engine.
//!
//! One [`AnalysisContext`] owns every structure of a run. Records flow from
//! the orderer into the window, where ingestion updates profiles, versions
//! and the graph; once the window head is ready, the checkers inspect it and
//! their conclusions are applied before the head is retired.

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::time::Duration;

use crate::checker::{CheckInput, HeadOutcome, ReadMatch, check_head};
use crate::config::AnalysisConfig;
use crate::error::Error;
use crate::finding::{Finding, OrderingDependency};
use crate::graph::{Dependency, DependencyGraph, DependencyKind, EdgeOutcome, RetentionOracle};
use crate::orderer::GlobalOrderer;
use crate::profile::ProfileRegistry;
use crate::source::TraceSource;
use crate::stats::{Footprint, Statistics, StatisticsSnapshot, StatsReporter};
use crate::trace::{Interval, Key, OperationKind, Timestamp, TraceRecord, TransactionId, TupleTrace};
use crate::version::{INITIAL_OWNER, RowImage, VersionStore};
use crate::window::AnalysisWindow;

/// Everything a run produced.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub ordering: Vec<OrderingDependency>,
    pub statistics: StatisticsSnapshot,
}

impl Report {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

struct Retention<'a> {
    profiles: &'a ProfileRegistry,
    versions: &'a VersionStore,
}

impl RetentionOracle for Retention<'_> {
    fn is_active(&self, transaction: TransactionId) -> bool {
        self.profiles.is_active(transaction)
    }

    fn earliest_active_begin(&self) -> Option<Timestamp> {
        self.profiles.earliest_active_begin()
    }

    fn versions_settled(&self, transaction: TransactionId) -> bool {
        self.versions.versions_settled(transaction)
    }
}

pub struct AnalysisContext<S> {
    config: AnalysisConfig,
    orderer: GlobalOrderer<S>,
    window: AnalysisWindow,
    profiles: ProfileRegistry,
    versions: VersionStore,
    graph: DependencyGraph,
    findings: Vec<Finding>,
    ordering: Vec<OrderingDependency>,
    stats: Arc<Statistics>,
    advances: usize,
}

impl<S: TraceSource> AnalysisContext<S> {
    /// Sets up a run over the given per-thread sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge pool cannot be built.
    pub fn new(config: AnalysisConfig, sources: Vec<S>) -> Result<Self, Error> {
        let orderer = GlobalOrderer::new(sources, config.merge_batch, config.merge_threads)?;
        Ok(Self {
            window: AnalysisWindow::new(config.garbage_collection),
            graph: DependencyGraph::new(
                config.max_cycle_length,
                config.prune_threshold,
                config.skip_non_concurrent,
            ),
            orderer,
            profiles: ProfileRegistry::default(),
            versions: VersionStore::default(),
            findings: Vec::new(),
            ordering: Vec::new(),
            stats: Arc::new(Statistics::default()),
            advances: 0,
            config,
        })
    }

    /// Declares the contents of rows as they were before the trace began.
    pub fn seed_initial(&mut self, tuples: impl IntoIterator<Item = TupleTrace>) {
        for tuple in tuples {
            self.versions.seed_initial(&tuple);
        }
    }

    #[must_use]
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    #[must_use]
    pub const fn versions(&self) -> &VersionStore {
        &self.versions
    }

    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    #[must_use]
    pub const fn window(&self) -> &AnalysisWindow {
        &self.window
    }

    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Analyzes every record of every source.
    ///
    /// # Errors
    ///
    /// Fails on unreadable input or when the trace contradicts the engine's
    /// model (a record of an unknown transaction, a transaction started or
    /// ended twice, a source out of order).
    pub fn run(mut self) -> Result<Report, Error> {
        let _reporter = self
            .config
            .stats_interval_ms
            .map(|ms| StatsReporter::spawn(self.statistics(), Duration::from_millis(ms)));
        tracing::info!(
            gc = self.config.garbage_collection,
            cycles = self.config.verify_cycles,
            dbms = %self.config.capabilities.dbms,
            "analysis started"
        );
        while self.step()? {}
        Ok(self.finish())
    }

    /// Does one unit of work: analyzes the window head if it is ready, or
    /// ingests one more record. Returns `false` once everything is analyzed.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn step(&mut self) -> Result<bool, Error> {
        if self.window.is_drained() {
            return self.ingest();
        }
        if self.head_ready()? {
            self.advance()?;
        } else if !self.ingest()? {
            if let Some(head) = self.window.head() {
                tracing::debug!(%head, "input exhausted, analyzing head as is");
            }
            self.advance()?;
        }
        Ok(true)
    }

    /// Final write-write sweep over every key, then the report.
    #[must_use]
    pub fn finish(mut self) -> Report {
        let keys: Vec<Key> = self.versions.keys().cloned().collect();
        for key in &keys {
            for dependency in self.versions.track_ww(key, true) {
                self.add_dependency(dependency);
            }
        }
        let statistics = self.stats.snapshot();
        tracing::info!(
            findings = self.findings.len(),
            analyzed = statistics.analyzed,
            ww = statistics.ww,
            wr = statistics.wr,
            rw = statistics.rw,
            "analysis finished"
        );
        Report {
            findings: self.findings,
            ordering: self.ordering,
            statistics,
        }
    }

    fn ingest(&mut self) -> Result<bool, Error> {
        let Some(record) = self.orderer.next_ready()? else {
            return Ok(false);
        };
        self.stats.record_ingested();
        self.accept(&record)?;
        self.window.push(record);
        Ok(true)
    }

    fn accept(&mut self, record: &TraceRecord) -> Result<(), Error> {
        let transaction = record.transaction_id;
        match record.kind {
            OperationKind::Start => {
                let begin = self.profiles.begin(record)?.begin;
                if self.config.verify_cycles {
                    let retention = Retention {
                        profiles: &self.profiles,
                        versions: &self.versions,
                    };
                    let pruned = self.graph.add_profile(transaction, begin, &retention);
                    self.stats.record_pruned(pruned.len());
                }
            }
            OperationKind::Commit | OperationKind::Rollback => {
                self.profiles.finish(record)?;
                let keys = self.versions.finalize(record)?;
                self.graph.complete(transaction, record.interval());
                for key in &keys {
                    self.track_ww(key);
                }
            }
            OperationKind::Select
            | OperationKind::Insert
            | OperationKind::Update
            | OperationKind::Delete => {
                self.profiles.observe(record, &self.config.capabilities)?;
                for tuple in &record.read_tuples {
                    self.versions.ensure_chain(&tuple.key(), RowImage::Unknown);
                }
                if record.kind.is_write() {
                    self.versions.ingest_write(record)?;
                }
            }
            OperationKind::Ddl | OperationKind::DistributeSchedule | OperationKind::Fault => {}
        }
        Ok(())
    }

    fn head_ready(&self) -> Result<bool, Error> {
        let Some(head) = self.window.head() else {
            return Ok(false);
        };
        if !head.kind.is_transactional() {
            return Ok(true);
        }
        let profile = self.profiles.require(head)?;
        Ok(self.window.is_ready(profile, self.orderer.cordon_line()))
    }

    fn advance(&mut self) -> Result<(), Error> {
        let outcome = match self.window.head() {
            Some(head) if head.kind.is_data() => {
                let input = CheckInput {
                    head,
                    profile: self.profiles.require(head)?,
                    window: &self.window,
                    versions: &self.versions,
                    capabilities: &self.config.capabilities,
                };
                Some(check_head(&input, self.config.parallel_checkers))
            }
            _ => None,
        };
        if let Some(outcome) = outcome {
            self.apply(outcome)?;
        }

        let Some(record) = self.window.remove() else {
            return Ok(());
        };
        self.stats.record_analyzed();
        self.retire(&record);

        self.advances += 1;
        if self.config.garbage_collection
            && self.config.gc_interval > 0
            && self.advances % self.config.gc_interval == 0
        {
            self.sweep();
        }
        self.stats.set_footprint(self.footprint());
        Ok(())
    }

    fn apply(&mut self, outcome: HeadOutcome) -> Result<(), Error> {
        for (name, outcome) in outcome.into_named() {
            self.stats.record_checker_time(name, outcome.elapsed);
            for finding in outcome.findings {
                self.report(finding);
            }
            self.ordering.extend(outcome.ordering);
            for read in outcome.reads {
                self.apply_read(read)?;
            }
        }
        Ok(())
    }

    fn apply_read(&mut self, read: ReadMatch) -> Result<(), Error> {
        let registration = self
            .versions
            .register_reader(read.version, read.reader, &read.observed)?;
        let writer = registration.writer;
        if writer.transaction != INITIAL_OWNER && writer.transaction != read.reader.transaction {
            self.add_dependency(Dependency::new(
                DependencyKind::WR,
                writer,
                read.reader,
                read.key.clone(),
            ));
        }
        if let Some(successor) = registration.successor {
            if successor.transaction != read.reader.transaction {
                self.add_dependency(Dependency::new(
                    DependencyKind::RW,
                    read.reader,
                    successor,
                    read.key,
                ));
            }
        }
        Ok(())
    }

    fn retire(&mut self, record: &TraceRecord) {
        let transaction = record.transaction_id;
        if record.kind.is_write() {
            self.versions.record_own_write(record);
        }
        if record.kind.is_terminal() {
            self.versions.drop_own_writes(transaction);
            self.profiles.deactivate(transaction);
            if self.config.garbage_collection {
                for key in self.versions.keys_written_by(transaction) {
                    self.collect(&key);
                }
            }
            if !self.versions.has_writes(transaction) {
                self.profiles.remove(transaction);
            }
        }
    }

    /// Earliest time any future read may still look back to.
    fn gc_horizon(&self) -> Timestamp {
        [
            self.profiles.earliest_active_begin(),
            self.window.head().map(|head| head.start_ts),
            self.window.last_start(),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(Timestamp::MAX)
    }

    fn collect(&mut self, key: &Key) {
        let horizon = Interval::at(self.gc_horizon());
        let profiles = &self.profiles;
        let report = self
            .versions
            .collect_garbage(key, horizon, |transaction| profiles.is_active(transaction));
        self.stats.record_collected(report.removed);
        for dependency in report.inferred {
            self.add_dependency(dependency);
        }
        for transaction in report.released {
            self.profiles.remove(transaction);
        }
    }

    fn sweep(&mut self) {
        let keys: Vec<Key> = self.versions.keys().cloned().collect();
        for key in &keys {
            self.collect(key);
        }
        tracing::debug!(
            keys = keys.len(),
            versions = self.versions.version_count(),
            profiles = self.profiles.len(),
            "garbage collection sweep"
        );
    }

    fn track_ww(&mut self, key: &Key) {
        for dependency in self.versions.track_ww(key, false) {
            self.add_dependency(dependency);
        }
    }

    fn add_dependency(&mut self, dependency: Dependency) {
        let toggles = self.config.dependencies;
        let enabled = match dependency.kind {
            DependencyKind::WW => toggles.ww,
            DependencyKind::WR => toggles.wr,
            DependencyKind::RW => toggles.rw,
        };
        if !enabled {
            return;
        }
        self.stats.record_dependency(dependency.kind);
        if !self.config.verify_cycles {
            return;
        }
        tracing::trace!(%dependency, "dependency");
        if let EdgeOutcome::Inserted { cycles } = self.graph.add_dependency(dependency) {
            for edges in cycles {
                self.report(Finding::DependencyCycleError { edges });
            }
        }
    }

    fn report(&mut self, finding: Finding) {
        tracing::warn!(kind = finding.kind().name(), "{finding}");
        self.stats.record_finding(finding.kind());
        self.findings.push(finding);
    }

    fn footprint(&self) -> Footprint {
        Footprint {
            window: self.window.len(),
            keys: self.versions.key_count(),
            versions: self.versions.version_count(),
            profiles: self.profiles.len(),
            active: self.profiles.active_len(),
            vertices: self.graph.vertex_count(),
            edges: self.graph.edge_count(),
        }
    }
}

/// Runs one analysis over the given sources.
///
/// # Errors
///
/// See [`AnalysisContext::run`].
pub fn check<S: TraceSource>(config: AnalysisConfig, sources: Vec<S>) -> Result<Report, Error> {
    AnalysisContext::new(config, sources)?.run()
}

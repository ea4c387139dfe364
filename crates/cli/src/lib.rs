//! tracecop CLI -- generate and verify recorded database traces.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracecop_core::finding::OrderingDependency;
use tracecop_core::{AnalysisConfig, Capabilities, Error, Finding, TraceRecord, TupleTrace};

#[derive(Debug, Parser)]
#[command(
    name = "tracecop",
    about = "Black-box isolation checking of recorded database traces"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a trace for isolation anomalies
    Verify(VerifyArgs),
    /// Generate a serial, anomaly-free synthetic trace
    Generate(GenerateArgs),
    /// Print the JSON Schema for one trace line to stdout
    Schema,
}

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Trace files, one JSON-lines file per client thread
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Initial rows, one JSON tuple per line
    #[arg(long)]
    pub initial: Option<PathBuf>,
    /// JSON configuration file; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Database engine whose isolation semantics apply
    #[arg(long)]
    pub dbms: Option<Dbms>,
    /// Keep every version and analyzed record until the end of the run
    #[arg(long)]
    pub no_gc: bool,
    /// Skip the dependency graph and cycle search
    #[arg(long)]
    pub no_cycles: bool,
    /// Longest dependency cycle to report
    #[arg(long)]
    pub max_cycle_length: Option<usize>,
    /// Run the per-record checkers in parallel
    #[arg(long)]
    pub parallel: bool,
    /// Log progress statistics every N milliseconds
    #[arg(long)]
    pub stats_interval_ms: Option<u64>,
    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
    /// Write one JSON certificate per finding into this directory
    #[arg(long)]
    pub certificates: Option<PathBuf>,
    /// Write the inferred ordering dependencies to this file as JSON lines
    #[arg(long)]
    pub ordering: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dbms {
    Mysql,
    Postgresql,
}

impl From<Dbms> for Capabilities {
    fn from(dbms: Dbms) -> Self {
        match dbms {
            Dbms::Mysql => Self::mysql(),
            Dbms::Postgresql => Self::postgresql(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of client threads
    #[arg(long)]
    pub n_thread: u64,
    /// Number of rows
    #[arg(long)]
    pub n_key: u64,
    /// Number of transactions per thread
    #[arg(long)]
    pub n_txn: u64,
    /// Number of data operations per transaction
    #[arg(long)]
    pub n_op: u64,
    /// Percentage of transactions that roll back
    #[arg(long, default_value_t = 0)]
    pub abort_percent: u32,
    /// Output directory for the thread files and `initial.jsonl`
    #[arg(long)]
    pub output_dir: PathBuf,
}

impl VerifyArgs {
    /// The configuration file, if any, with the command-line flags applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn analysis_config(&self) -> Result<AnalysisConfig, Error> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
            None => AnalysisConfig::default(),
        };
        if let Some(dbms) = self.dbms {
            config.capabilities = dbms.into();
        }
        if self.no_gc {
            config.garbage_collection = false;
        }
        if self.no_cycles {
            config.verify_cycles = false;
        }
        if let Some(length) = self.max_cycle_length {
            config.max_cycle_length = length;
        }
        if self.parallel {
            config.parallel_checkers = true;
        }
        if self.stats_interval_ms.is_some() {
            config.stats_interval_ms = self.stats_interval_ms;
        }
        Ok(config)
    }
}

/// Reads initial rows, one JSON tuple per line.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is not a tuple.
pub fn read_initial(path: &Path) -> Result<Vec<TupleTrace>, Error> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<TupleTrace>()
        .map(|tuple| tuple.map_err(Error::from))
        .collect()
}

/// Writes `items` as JSON lines.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_json_lines<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one pretty-printed certificate per finding into `dir`, returning
/// how many were written. Files that cannot be written are logged and
/// skipped.
pub fn write_certificates(dir: &Path, findings: &[Finding]) -> usize {
    if let Err(e) = fs::create_dir_all(dir) {
        tracing::error!("cannot create certificate directory {}: {e}", dir.display());
        return 0;
    }
    let mut written = 0;
    for (index, finding) in findings.iter().enumerate() {
        let path = dir.join(format!("{index:05}-{}.json", finding.kind().name()));
        let result = File::create(&path)
            .map_err(Error::from)
            .and_then(|file| serde_json::to_writer_pretty(file, finding).map_err(Error::from));
        match result {
            Ok(()) => written += 1,
            Err(e) => tracing::error!("cannot write certificate {}: {e}", path.display()),
        }
    }
    written
}

/// Writes ordering dependencies as JSON lines.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_ordering(path: &Path, ordering: &[OrderingDependency]) -> Result<(), Error> {
    write_json_lines(path, ordering)
}

/// Writes a generated trace as `thread-<n>.jsonl` files plus `initial.jsonl`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub fn write_trace(
    dir: &Path,
    initial: &[TupleTrace],
    threads: &[Vec<TraceRecord>],
) -> Result<(), Error> {
    fs::create_dir_all(dir)?;
    write_json_lines(&dir.join("initial.jsonl"), initial)?;
    for (thread, records) in threads.iter().enumerate() {
        write_json_lines(&dir.join(format!("thread-{thread}.jsonl")), records)?;
    }
    Ok(())
}

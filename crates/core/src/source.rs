//! Per-thread trace sources.
//!
//! Every client thread of the workload leaves behind its own stream of
//! records, ordered by `start_ts` because a thread issues one operation at a
//! time. A [`TraceSource`] hands those records out one at a time; the
//! [`GlobalOrderer`](crate::orderer::GlobalOrderer) merges many of them.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use std::io::BufRead;

use crate::error::Error;
use crate::trace::TraceRecord;

/// A locally start-time-ordered stream of trace records.
pub trait TraceSource: Send {
    /// Returns the next record, or `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream cannot be read or decoded.
    fn next_record(&mut self) -> Result<Option<TraceRecord>, Error>;
}

/// Records already in memory.
#[derive(Debug, Default)]
pub struct VecSource {
    records: VecDeque<TraceRecord>,
}

impl VecSource {
    #[must_use]
    pub fn new(records: Vec<TraceRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }
}

impl TraceSource for VecSource {
    fn next_record(&mut self) -> Result<Option<TraceRecord>, Error> {
        Ok(self.records.pop_front())
    }
}

impl<T: TraceSource + ?Sized> TraceSource for alloc::boxed::Box<T> {
    fn next_record(&mut self) -> Result<Option<TraceRecord>, Error> {
        (**self).next_record()
    }
}

/// One JSON object per line. Blank lines are skipped.
#[cfg(feature = "serde")]
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    line: alloc::string::String,
}

#[cfg(feature = "serde")]
impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: alloc::string::String::new(),
        }
    }
}

#[cfg(feature = "serde")]
impl JsonLinesSource<std::io::BufReader<std::fs::File>> {
    /// Opens a trace file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file)))
    }
}

#[cfg(feature = "serde")]
impl<R: BufRead + Send> TraceSource for JsonLinesSource<R> {
    fn next_record(&mut self) -> Result<Option<TraceRecord>, Error> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();
            if !line.is_empty() {
                return Ok(Some(serde_json::from_str(line)?));
            }
        }
    }
}

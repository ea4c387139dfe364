//! Merging per-thread sources into one start-time-ordered stream.
//!
//! Each source is ordered on its own, but nothing bounds how far apart two
//! sources drift. The orderer therefore only releases a record once every
//! source that could still produce something earlier has moved past it. That
//! boundary is the *cordon line*: the smallest start time any non-exhausted
//! source may still yield.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use rayon::prelude::*;

use crate::error::Error;
use crate::source::TraceSource;
use crate::trace::{Timestamp, TraceRecord};

#[derive(Debug)]
struct SourceState<S> {
    index: usize,
    source: S,
    /// The record the source will hand out next.
    peeked: Option<TraceRecord>,
    primed: bool,
    last_start: Option<Timestamp>,
}

impl<S: TraceSource> SourceState<S> {
    const fn new(index: usize, source: S) -> Self {
        Self {
            index,
            source,
            peeked: None,
            primed: false,
            last_start: None,
        }
    }

    fn pull(&mut self) -> Result<Option<TraceRecord>, Error> {
        let next = self.source.next_record()?;
        if let Some(record) = &next {
            if let Some(previous) = self.last_start {
                if record.start_ts < previous {
                    return Err(Error::UnorderedSource {
                        source: self.index,
                        previous,
                        next: record.start_ts,
                    });
                }
            }
            self.last_start = Some(record.start_ts);
        }
        Ok(next)
    }

    /// Takes up to `batch` records, keeping one peeked record behind so the
    /// source's low watermark stays known.
    fn drain(&mut self, batch: usize) -> Result<Vec<TraceRecord>, Error> {
        if !self.primed {
            self.peeked = self.pull()?;
            self.primed = true;
        }
        let mut drained = Vec::new();
        while drained.len() < batch {
            let Some(record) = self.peeked.take() else {
                break;
            };
            drained.push(record);
            self.peeked = self.pull()?;
        }
        Ok(drained)
    }

    fn is_exhausted(&self) -> bool {
        self.primed && self.peeked.is_none()
    }

    /// Smallest start time this source may still produce.
    fn low_watermark(&self) -> Timestamp {
        if self.primed {
            self.peeked
                .as_ref()
                .map_or(Timestamp::MAX, |record| record.start_ts)
        } else {
            Timestamp::MIN
        }
    }
}

/// K-way merge of [`TraceSource`]s.
#[derive(Debug)]
pub struct GlobalOrderer<S> {
    sources: Vec<SourceState<S>>,
    buffer: VecDeque<TraceRecord>,
    batch: usize,
    pool: Option<rayon::ThreadPool>,
}

impl<S: TraceSource> GlobalOrderer<S> {
    /// Builds an orderer draining up to `batch` records per source and merge
    /// round on a pool of `threads` workers (`0` uses the global pool).
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be created.
    pub fn new(sources: Vec<S>, batch: usize, threads: usize) -> Result<Self, Error> {
        let pool = if threads == 0 {
            None
        } else {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("tracecop-merge-{i}"))
                    .build()?,
            )
        };
        Ok(Self {
            sources: sources
                .into_iter()
                .enumerate()
                .map(|(index, source)| SourceState::new(index, source))
                .collect(),
            buffer: VecDeque::new(),
            batch: batch.max(1),
            pool,
        })
    }

    /// Drains every source once, in parallel, and folds the results into the
    /// buffer. Returns the number of records taken in.
    ///
    /// # Errors
    ///
    /// Propagates the first source error.
    pub fn merge(&mut self) -> Result<usize, Error> {
        let batch = self.batch;
        let sources = &mut self.sources;
        let mut drain = move || {
            sources
                .par_iter_mut()
                .map(|state| state.drain(batch))
                .collect::<Result<Vec<_>, Error>>()
        };
        let batches = match &self.pool {
            Some(pool) => pool.install(drain)?,
            None => drain()?,
        };

        let mut merged = 0;
        for record in batches.into_iter().flatten() {
            let at = self
                .buffer
                .partition_point(|buffered| buffered.start_ts <= record.start_ts);
            self.buffer.insert(at, record);
            merged += 1;
        }

        tracing::debug!(
            merged,
            buffered = self.buffer.len(),
            watermark = self.watermark(),
            "merge round"
        );
        Ok(merged)
    }

    /// Releases the earliest buffered record if it is safely below the cordon.
    pub fn pop_ready(&mut self) -> Option<TraceRecord> {
        let front = self.buffer.front()?;
        if front.start_ts < self.watermark() || self.sources_exhausted() {
            self.buffer.pop_front()
        } else {
            None
        }
    }

    /// The next record in global start order, merging as needed.
    ///
    /// # Errors
    ///
    /// Propagates source errors.
    pub fn next_ready(&mut self) -> Result<Option<TraceRecord>, Error> {
        loop {
            if let Some(record) = self.pop_ready() {
                return Ok(Some(record));
            }
            if self.sources_exhausted() {
                return Ok(None);
            }
            self.merge()?;
        }
    }

    /// Smallest start time a record still inside some source may have.
    fn watermark(&self) -> Timestamp {
        self.sources
            .iter()
            .map(SourceState::low_watermark)
            .min()
            .unwrap_or(Timestamp::MAX)
    }

    /// Smallest start time a not-yet-released record may have.
    #[must_use]
    pub fn cordon_line(&self) -> Timestamp {
        let watermark = self.watermark();
        self.buffer
            .front()
            .map_or(watermark, |front| front.start_ts.min(watermark))
    }

    /// Every source has been read to its end.
    #[must_use]
    pub fn sources_exhausted(&self) -> bool {
        self.sources.iter().all(SourceState::is_exhausted)
    }

    /// Nothing is left to hand out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.sources_exhausted()
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

//! The analysis window.
//!
//! Records enter in global start order and leave from the head once the head
//! can be analyzed without missing any record that might still matter to it.

use alloc::collections::VecDeque;

use crate::profile::Profile;
use crate::trace::{LockMode, Timestamp, TraceRecord};

#[derive(Debug, Default)]
pub struct AnalysisWindow {
    records: VecDeque<TraceRecord>,
    cursor: usize,
    /// Drop analyzed records instead of keeping them behind the cursor.
    compact: bool,
    last_start: Option<Timestamp>,
    analyzed: usize,
}

impl AnalysisWindow {
    #[must_use]
    pub fn new(compact: bool) -> Self {
        Self {
            compact,
            ..Self::default()
        }
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.last_start = Some(record.start_ts);
        self.records.push_back(record);
    }

    /// The next record to analyze.
    #[must_use]
    pub fn head(&self) -> Option<&TraceRecord> {
        self.records.get(self.cursor)
    }

    /// The most recently ingested record.
    #[must_use]
    pub fn last(&self) -> Option<&TraceRecord> {
        self.records.back()
    }

    /// Start time of the most recently ingested record, remembered after the
    /// window drains.
    #[must_use]
    pub const fn last_start(&self) -> Option<Timestamp> {
        self.last_start
    }

    /// Records ingested after the head, oldest first.
    pub fn ahead(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter().skip(self.cursor + 1)
    }

    /// Moves past the head, handing it back.
    pub fn remove(&mut self) -> Option<TraceRecord> {
        let head = if self.compact {
            self.records.pop_front()
        } else {
            let head = self.records.get(self.cursor).cloned();
            if head.is_some() {
                self.cursor += 1;
            }
            head
        };
        if head.is_some() {
            self.analyzed += 1;
        }
        head
    }

    /// Whether the head has seen everything it can depend on.
    ///
    /// Ready when its transaction is settled, either perfect and finished
    /// before the newest ingested record started, or running on a
    /// non-locking snapshot; and the head itself finished both before the
    /// newest record started and below the orderer's cordon line.
    #[must_use]
    pub fn is_ready(&self, profile: &Profile, cordon: Timestamp) -> bool {
        let (Some(head), Some(last)) = (self.head(), self.last()) else {
            return false;
        };
        if !head.kind.is_transactional() {
            return true;
        }
        let settled = profile
            .end
            .is_some_and(|end| end.finish <= last.start_ts)
            || (!profile.is_perfect()
                && profile.snapshot.is_some()
                && head.lock_mode == LockMode::NonLock);
        settled && head.finish_ts < last.start_ts && head.finish_ts < cordon
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.head().is_none()
    }

    /// Records awaiting analysis.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.records.len() - self.cursor.min(self.records.len())
    }

    /// Records physically held, analyzed ones included when not compacting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn analyzed(&self) -> usize {
        self.analyzed
    }
}

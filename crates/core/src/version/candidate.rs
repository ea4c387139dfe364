//! The candidate read set of a snapshot.
//!
//! Given a read's snapshot interval, the candidates are every version the
//! database could legally have returned. The walk runs newest to oldest in
//! four phases:
//!
//! 1. versions whose interval overlaps the snapshot,
//! 2. from the first version over before the snapshot began, versions whose
//!    visibility is uncertain, until the first certainly visible one (the
//!    *pivot*),
//! 3. older versions overlapping the pivot,
//! 4. everything else, which no read at or after the snapshot can observe.
//!
//! The last phase is only collected for garbage collection.

use alloc::vec::Vec;

use super::{Version, VersionArena, VersionChain, VersionId, VersionStatus};
use crate::trace::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchMode {
    /// Uncommitted versions are readable (`READ UNCOMMITTED`).
    pub include_uncommitted: bool,
    /// Collect unreachable versions into [`CandidateSet::garbage`].
    pub collect_garbage: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    /// Newest first.
    pub candidates: Vec<VersionId>,
    pub pivot: Option<VersionId>,
    pub garbage: Vec<VersionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Visible,
    Uncertain,
    Invisible,
}

fn readable(version: &Version, mode: SearchMode) -> bool {
    version.is_committed()
        || (mode.include_uncommitted && version.status == VersionStatus::Uncommitted)
}

fn visibility(version: &Version, snapshot: Interval, mode: SearchMode) -> Visibility {
    if !readable(version, mode) {
        return Visibility::Invisible;
    }
    if version.is_committed() && version.interval.finish <= snapshot.start {
        Visibility::Visible
    } else {
        Visibility::Uncertain
    }
}

/// Runs the four-phase search over `chain` for a read with the given snapshot.
#[must_use]
pub fn candidate_read_set(
    chain: &VersionChain,
    arena: &VersionArena,
    snapshot: Interval,
    mode: SearchMode,
) -> CandidateSet {
    let mut set = CandidateSet::default();
    let mut versions = chain.iter(arena).peekable();

    // phase 1
    while let Some(version) = versions.next_if(|v| v.interval.finish > snapshot.start) {
        if version.interval.start <= snapshot.finish && readable(version, mode) {
            set.candidates.push(version.id);
        }
    }

    // phase 2
    for version in versions.by_ref() {
        match visibility(version, snapshot, mode) {
            Visibility::Visible => {
                set.candidates.push(version.id);
                set.pivot = Some(version.id);
                break;
            }
            Visibility::Uncertain => set.candidates.push(version.id),
            Visibility::Invisible => {}
        }
    }

    let Some(pivot) = set.pivot.and_then(|id| arena.get(id)) else {
        return set;
    };

    // phases 3 and 4
    for version in versions {
        if version.interval.finish >= pivot.interval.start {
            if readable(version, mode) {
                set.candidates.push(version.id);
            }
        } else if mode.collect_garbage {
            set.garbage.push(version.id);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::trace::{Key, OperationId, OperationKind, TransactionId};
    use crate::version::RowImage;

    struct Fixture {
        arena: VersionArena,
        chain: VersionChain,
    }

    impl Fixture {
        fn new() -> Self {
            let mut fixture = Self {
                arena: VersionArena::default(),
                chain: VersionChain::default(),
            };
            fixture.push(0, VersionStatus::Initial, 0, 0);
            fixture
        }

        fn push(&mut self, owner: u64, status: VersionStatus, start: u64, finish: u64) -> VersionId {
            let id = self.arena.next_id();
            self.arena.insert(Version {
                id,
                key: Key::new("t", "1"),
                owner: TransactionId(owner),
                operation: OperationId(owner),
                interval: Interval::new(start, finish),
                image: RowImage::Unknown,
                status,
                producer: OperationKind::Update,
                successor: None,
                ww_checked: false,
                readers: vec![],
            });
            self.chain.push_newest(id);
            id
        }

        fn search(&self, start: u64, finish: u64, include_uncommitted: bool) -> CandidateSet {
            candidate_read_set(
                &self.chain,
                &self.arena,
                Interval::new(start, finish),
                SearchMode {
                    include_uncommitted,
                    collect_garbage: true,
                },
            )
        }
    }

    /// initial, then T1 commits at [10,12), T2 writes at [14,15) and commits
    /// at [20,22), T3 writes at [25,26) and never commits.
    fn chain() -> (Fixture, [VersionId; 5]) {
        let mut f = Fixture::new();
        let initial = VersionId(1);
        let c1 = f.push(1, VersionStatus::Committed, 10, 12);
        let u2 = f.push(2, VersionStatus::Uncommitted, 14, 15);
        let c2 = f.push(2, VersionStatus::Committed, 20, 22);
        let u3 = f.push(3, VersionStatus::Uncommitted, 25, 26);
        (f, [initial, c1, u2, c2, u3])
    }

    #[test]
    fn snapshot_before_all_writes_sees_only_initial() {
        let (f, [initial, ..]) = chain();
        let set = f.search(2, 3, false);
        assert_eq!(set.candidates, vec![initial]);
        assert_eq!(set.pivot, Some(initial));
        assert!(set.garbage.is_empty());
    }

    #[test]
    fn snapshot_inside_a_commit_sees_both_sides() {
        let (f, [initial, c1, ..]) = chain();
        let set = f.search(11, 13, false);
        assert_eq!(set.candidates, vec![c1, initial]);
        assert_eq!(set.pivot, Some(initial));
    }

    #[test]
    fn snapshot_spanning_a_commit_boundary() {
        let (f, [initial, c1, _, c2, _]) = chain();
        let set = f.search(18, 21, false);
        assert_eq!(set.candidates, vec![c2, c1]);
        assert_eq!(set.pivot, Some(c1));
        assert_eq!(set.garbage, vec![initial]);
    }

    #[test]
    fn uncommitted_reads_see_pending_writes() {
        let (f, [initial, c1, u2, c2, u3]) = chain();
        let set = f.search(30, 31, true);
        assert_eq!(set.candidates, vec![u3, c2]);
        assert_eq!(set.garbage, vec![u2, c1, initial]);

        let set = f.search(16, 17, true);
        assert_eq!(set.candidates, vec![u2, c1]);
    }

    #[test]
    fn overlapping_older_commit_stays_a_candidate() {
        let mut f = Fixture::new();
        let long = f.push(1, VersionStatus::Committed, 5, 30);
        let short = f.push(2, VersionStatus::Committed, 10, 12);
        let set = f.search(40, 41, false);
        assert_eq!(set.pivot, Some(short));
        assert_eq!(set.candidates, vec![short, long]);
    }

    #[test]
    fn garbage_is_not_collected_by_plain_reads() {
        let (f, _) = chain();
        let set = candidate_read_set(
            &f.chain,
            &f.arena,
            Interval::new(30, 31),
            SearchMode::default(),
        );
        assert!(set.garbage.is_empty());
    }
}

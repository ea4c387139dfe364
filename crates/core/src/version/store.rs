use alloc::vec::Vec;

use hashbrown::HashMap;

use super::candidate::{CandidateSet, SearchMode, candidate_read_set};
use super::{
    INITIAL_OWNER, RowImage, Version, VersionArena, VersionChain, VersionId, VersionStatus,
};
use crate::error::Error;
use crate::graph::{Dependency, DependencyKind};
use crate::trace::{
    Interval, Key, OpRef, OperationId, OperationKind, TraceRecord, TransactionId, TupleTrace,
    Values,
};

/// What registering a read did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRegistration {
    /// The transaction and operation that installed the version read.
    pub writer: OpRef,
    /// Set if the version already had a known overwriter.
    pub successor: Option<OpRef>,
}

/// What a garbage collection pass freed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageReport {
    pub inferred: Vec<Dependency>,
    pub removed: usize,
    /// Transactions whose history write-set became empty.
    pub released: Vec<TransactionId>,
}

/// Version chains plus the two write-sets.
///
/// The *history* write-set maps each transaction to the newest version it
/// installed per key, from ingestion until garbage collection removes the
/// version. The *own-write* write-set holds copies of the writes a
/// transaction has had analyzed so far, for checking that it reads its own
/// writes; it is dropped when the transaction's terminal record is analyzed.
#[derive(Debug, Default)]
pub struct VersionStore {
    arena: VersionArena,
    chains: HashMap<Key, VersionChain>,
    history_writes: HashMap<TransactionId, HashMap<Key, VersionId>>,
    own_writes: HashMap<TransactionId, HashMap<Key, Version>>,
}

impl VersionStore {
    fn new_version(
        &mut self,
        key: Key,
        owner: OpRef,
        interval: Interval,
        image: RowImage,
        status: VersionStatus,
        producer: OperationKind,
    ) -> VersionId {
        let id = self.arena.next_id();
        self.arena.insert(Version {
            id,
            key,
            owner: owner.transaction,
            operation: owner.operation,
            interval,
            image,
            status,
            producer,
            successor: None,
            ww_checked: status == VersionStatus::Rollback,
            readers: Vec::new(),
        })
    }

    /// Creates the chain of `key` with its initial version if it has none.
    pub fn ensure_chain(&mut self, key: &Key, image: RowImage) {
        if self.chains.contains_key(key) {
            return;
        }
        let id = self.new_version(
            key.clone(),
            OpRef::new(INITIAL_OWNER, OperationId::default()),
            Interval::at(0),
            image,
            VersionStatus::Initial,
            OperationKind::Insert,
        );
        let mut chain = VersionChain::default();
        chain.push_newest(id);
        self.chains.insert(key.clone(), chain);
    }

    /// Fixes the initial contents of a key. A present row overrides an
    /// unknown initial image; keys already known are left alone otherwise.
    pub fn seed_initial(&mut self, tuple: &TupleTrace) {
        let key = tuple.key();
        let image = RowImage::Present(tuple.observed_values.clone());
        let Some(chain) = self.chains.get(&key) else {
            self.ensure_chain(&key, image);
            return;
        };
        if let Some(initial) = chain.initial().and_then(|id| self.arena.get_mut(id)) {
            if initial.image == RowImage::Unknown {
                initial.image = image;
            }
        }
    }

    /// Models the versions produced by a write operation.
    ///
    /// A `Delete` of a row the same transaction inserted and has not yet
    /// committed annihilates its pending versions of the row instead of
    /// adding one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingWriteSetEntry`] if the write-set refers to a
    /// version that is gone.
    pub fn ingest_write(&mut self, record: &TraceRecord) -> Result<(), Error> {
        let transaction = record.transaction_id;
        for tuple in &record.write_tuples {
            let key = tuple.key();
            let initial = if record.kind == OperationKind::Insert {
                RowImage::Absent
            } else {
                RowImage::Unknown
            };
            self.ensure_chain(&key, initial);

            let pending = self
                .history_writes
                .get(&transaction)
                .and_then(|writes| writes.get(&key))
                .copied();
            let base = match pending {
                Some(id) => Some(
                    self.arena
                        .get(id)
                        .ok_or_else(|| Error::MissingWriteSetEntry {
                            transaction,
                            key: key.clone(),
                        })?,
                ),
                None => None,
            };

            if record.kind == OperationKind::Delete {
                if let Some(base) = base.filter(|base| {
                    base.status == VersionStatus::Uncommitted
                        && base.producer == OperationKind::Insert
                }) {
                    let owned: Vec<VersionId> = self
                        .chains
                        .get(&key)
                        .map(|chain| {
                            chain
                                .iter(&self.arena)
                                .filter(|version| {
                                    version.owner == transaction
                                        && version.status == VersionStatus::Uncommitted
                                })
                                .map(|version| version.id)
                                .collect()
                        })
                        .unwrap_or_default();
                    debug_assert!(owned.contains(&base.id));
                    for id in owned {
                        self.unlink(&key, id);
                    }
                    if let Some(writes) = self.history_writes.get_mut(&transaction) {
                        writes.remove(&key);
                        if writes.is_empty() {
                            self.history_writes.remove(&transaction);
                        }
                    }
                    tracing::trace!(%key, %transaction, "delete annihilated own insert");
                    continue;
                }
            }

            let (image, producer) = match base {
                Some(base) => (
                    base.image.apply(record.kind, &tuple.observed_values),
                    if base.producer == OperationKind::Insert
                        && record.kind == OperationKind::Update
                    {
                        OperationKind::Insert
                    } else {
                        record.kind
                    },
                ),
                None => {
                    let current = self
                        .chains
                        .get(&key)
                        .and_then(|chain| chain.committed(&self.arena).next())
                        .map_or(RowImage::Unknown, |version| version.image.clone());
                    (current.apply(record.kind, &tuple.observed_values), record.kind)
                }
            };
            let id = self.new_version(
                key.clone(),
                record.op_ref(),
                record.interval(),
                image,
                VersionStatus::Uncommitted,
                producer,
            );
            if let Some(chain) = self.chains.get_mut(&key) {
                chain.push_newest(id);
            }
            self.history_writes
                .entry(transaction)
                .or_default()
                .insert(key, id);
        }
        Ok(())
    }

    /// Installs the final version of every key the transaction wrote, with
    /// the terminal operation's interval. Returns the keys touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingWriteSetEntry`] if the write-set refers to a
    /// version that is gone.
    pub fn finalize(&mut self, record: &TraceRecord) -> Result<Vec<Key>, Error> {
        let transaction = record.transaction_id;
        let status = if record.kind == OperationKind::Commit {
            VersionStatus::Committed
        } else {
            VersionStatus::Rollback
        };
        let Some(writes) = self.history_writes.get(&transaction) else {
            return Ok(Vec::new());
        };
        let pending: Vec<(Key, VersionId)> = writes
            .iter()
            .map(|(key, id)| (key.clone(), *id))
            .collect();

        let mut keys = Vec::with_capacity(pending.len());
        for (key, id) in pending {
            let base = self
                .arena
                .get(id)
                .ok_or_else(|| Error::MissingWriteSetEntry {
                    transaction,
                    key: key.clone(),
                })?;
            if base.status != VersionStatus::Uncommitted {
                continue;
            }
            let (image, producer) = (base.image.clone(), base.producer);
            let id = self.new_version(
                key.clone(),
                record.op_ref(),
                record.interval(),
                image,
                status,
                producer,
            );
            if let Some(chain) = self.chains.get_mut(&key) {
                chain.push_newest(id);
            }
            if let Some(writes) = self.history_writes.get_mut(&transaction) {
                writes.insert(key.clone(), id);
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Copies the versions written by an analyzed write into the own-write
    /// write-set.
    ///
    /// A version already annihilated by a later `Delete` of the same
    /// transaction is rebuilt from the record on top of the previous own
    /// write.
    pub fn record_own_write(&mut self, record: &TraceRecord) {
        let transaction = record.transaction_id;
        for tuple in &record.write_tuples {
            let key = tuple.key();
            let produced = self.chains.get(&key).and_then(|chain| {
                chain.iter(&self.arena).find(|version| {
                    version.owner == transaction && version.operation == record.operation_id
                })
            });
            let version = match produced {
                Some(version) => version.clone(),
                None => self.rebuild_own_write(record, tuple),
            };
            self.own_writes
                .entry(transaction)
                .or_default()
                .insert(key, version);
        }
    }

    fn rebuild_own_write(&self, record: &TraceRecord, tuple: &TupleTrace) -> Version {
        let transaction = record.transaction_id;
        let key = tuple.key();
        let previous = self.own_write(transaction, &key);
        let (base, producer) = match previous {
            Some(previous) => (
                previous.image.clone(),
                if previous.producer == OperationKind::Insert
                    && record.kind == OperationKind::Update
                {
                    OperationKind::Insert
                } else {
                    record.kind
                },
            ),
            None => (
                self.chains
                    .get(&key)
                    .and_then(|chain| chain.committed(&self.arena).next())
                    .map_or(RowImage::Unknown, |version| version.image.clone()),
                record.kind,
            ),
        };
        Version {
            id: VersionId::default(),
            key,
            owner: transaction,
            operation: record.operation_id,
            interval: record.interval(),
            image: base.apply(record.kind, &tuple.observed_values),
            status: VersionStatus::Uncommitted,
            producer,
            successor: None,
            ww_checked: false,
            readers: Vec::new(),
        }
    }

    pub fn drop_own_writes(&mut self, transaction: TransactionId) {
        self.own_writes.remove(&transaction);
    }

    /// The transaction's latest analyzed write of `key`.
    #[must_use]
    pub fn own_write(&self, transaction: TransactionId, key: &Key) -> Option<&Version> {
        self.own_writes.get(&transaction)?.get(key)
    }

    #[must_use]
    pub fn chain(&self, key: &Key) -> Option<&VersionChain> {
        self.chains.get(key)
    }

    #[must_use]
    pub fn version(&self, id: VersionId) -> Option<&Version> {
        self.arena.get(id)
    }

    /// Versions of `key`, newest first.
    pub fn versions<'a>(&'a self, key: &Key) -> impl Iterator<Item = &'a Version> + 'a {
        self.chains
            .get(key)
            .into_iter()
            .flat_map(|chain| chain.iter(&self.arena))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.chains.keys()
    }

    /// Keys the transaction still has versions of.
    #[must_use]
    pub fn keys_written_by(&self, transaction: TransactionId) -> Vec<Key> {
        self.history_writes
            .get(&transaction)
            .map(|writes| writes.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_writes(&self, transaction: TransactionId) -> bool {
        self.history_writes.contains_key(&transaction)
    }

    /// Every version the transaction still holds has been ww-checked.
    #[must_use]
    pub fn versions_settled(&self, transaction: TransactionId) -> bool {
        self.history_writes.get(&transaction).is_none_or(|writes| {
            writes
                .values()
                .filter_map(|id| self.arena.get(*id))
                .all(|version| version.ww_checked)
        })
    }

    #[must_use]
    pub fn candidate_read_set(
        &self,
        key: &Key,
        snapshot: Interval,
        include_uncommitted: bool,
    ) -> CandidateSet {
        self.chains.get(key).map_or_else(CandidateSet::default, |chain| {
            candidate_read_set(
                chain,
                &self.arena,
                snapshot,
                SearchMode {
                    include_uncommitted,
                    collect_garbage: false,
                },
            )
        })
    }

    /// Unlinks versions of `key` that no read at or after `horizon` can
    /// observe. Initial versions and pending writes of active transactions
    /// survive.
    ///
    /// Write-write inference runs first so no garbage version takes its
    /// successor edges with it; whatever it inferred is returned in the
    /// report.
    pub fn collect_garbage<F>(&mut self, key: &Key, horizon: Interval, is_active: F) -> GarbageReport
    where
        F: Fn(TransactionId) -> bool,
    {
        let mut report = GarbageReport {
            inferred: self.track_ww(key, false),
            ..GarbageReport::default()
        };
        let Some(chain) = self.chains.get(key) else {
            return report;
        };
        let set = candidate_read_set(
            chain,
            &self.arena,
            horizon,
            SearchMode {
                include_uncommitted: true,
                collect_garbage: true,
            },
        );
        for id in set.garbage {
            let Some(version) = self.arena.get(id) else {
                continue;
            };
            let keep = match version.status {
                VersionStatus::Initial => true,
                VersionStatus::Uncommitted => is_active(version.owner),
                VersionStatus::Committed | VersionStatus::Rollback => false,
            };
            if keep {
                continue;
            }
            let owner = version.owner;
            self.unlink(key, id);
            report.removed += 1;

            if let Some(writes) = self.history_writes.get_mut(&owner) {
                if writes.get(key) == Some(&id) {
                    writes.remove(key);
                }
                if writes.is_empty() {
                    self.history_writes.remove(&owner);
                    report.released.push(owner);
                }
            }
        }
        if report.removed > 0 {
            tracing::trace!(%key, removed = report.removed, "collected versions");
        }
        report
    }

    fn unlink(&mut self, key: &Key, id: VersionId) {
        if let Some(chain) = self.chains.get_mut(key) {
            chain.remove(id);
        }
        self.arena.remove(id);
    }

    /// Records that `reader` observed version `id`, binding an unknown image
    /// to what it saw.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the version is gone.
    pub fn register_reader(
        &mut self,
        id: VersionId,
        reader: OpRef,
        observed: &Values,
    ) -> Result<ReadRegistration, Error> {
        let version = self
            .arena
            .get_mut(id)
            .ok_or_else(|| Error::Invariant(format!("read from collected version {id}")))?;
        if version.image == RowImage::Unknown {
            version.image = if observed.is_empty() {
                RowImage::Absent
            } else {
                RowImage::Present(observed.clone())
            };
        }
        version.readers.push(reader);
        Ok(ReadRegistration {
            writer: version.op_ref(),
            successor: version.successor,
        })
    }

    /// Infers write-write order along the committed versions of `key`.
    ///
    /// For each adjacent pair whose older member is not yet checked and whose
    /// intervals do not overlap, the older version's owner precedes the newer
    /// one's (`WW`), and every reader of the older version precedes the newer
    /// owner (`RW`). Overlapping pairs have no certain order and stay
    /// unchecked. With `exhausted`, every version is marked since nothing
    /// more can be learned about the key.
    pub fn track_ww(&mut self, key: &Key, exhausted: bool) -> Vec<Dependency> {
        let Some(chain) = self.chains.get(key) else {
            return Vec::new();
        };
        let committed: Vec<VersionId> = chain.committed(&self.arena).map(|v| v.id).collect();

        let mut inferred = Vec::new();
        for pair in committed.windows(2) {
            let (Some(newer), Some(older)) = (self.arena.get(pair[0]), self.arena.get(pair[1]))
            else {
                continue;
            };
            if older.ww_checked {
                continue;
            }
            if older.interval.overlaps(&newer.interval) {
                continue;
            }
            let overwriter = newer.op_ref();
            if older.status != VersionStatus::Initial {
                inferred.push(Dependency::new(
                    DependencyKind::WW,
                    older.op_ref(),
                    overwriter,
                    key.clone(),
                ));
            }
            inferred.extend(
                older
                    .readers
                    .iter()
                    .filter(|reader| reader.transaction != overwriter.transaction)
                    .map(|reader| {
                        Dependency::new(DependencyKind::RW, *reader, overwriter, key.clone())
                    }),
            );
            if let Some(older) = self.arena.get_mut(pair[1]) {
                older.successor = Some(overwriter);
                older.ww_checked = true;
            }
        }
        if exhausted {
            for id in &committed {
                if let Some(version) = self.arena.get_mut(*id) {
                    version.ww_checked = true;
                }
            }
        }
        inferred
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn version_count(&self) -> usize {
        self.arena.len()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::trace::{IsolationLevel, LockMode, ReadMode};

    fn write(
        txn: u64,
        op: u64,
        kind: OperationKind,
        start: u64,
        finish: u64,
        value: &str,
    ) -> TraceRecord {
        TraceRecord {
            operation_id: OperationId(op),
            transaction_id: TransactionId(txn),
            thread_id: txn,
            kind,
            start_ts: start,
            finish_ts: finish,
            isolation_level: None::<IsolationLevel>,
            lock_mode: LockMode::ExclusiveLock,
            read_mode: ReadMode::LockingRead,
            read_tuples: Vec::new(),
            write_tuples: vec![TupleTrace::new("t", "x", [("v", value)])],
        }
    }

    fn terminal(txn: u64, op: u64, kind: OperationKind, start: u64, finish: u64) -> TraceRecord {
        TraceRecord {
            write_tuples: Vec::new(),
            lock_mode: LockMode::NonLock,
            ..write(txn, op, kind, start, finish, "")
        }
    }

    fn key() -> Key {
        Key::new("t", "x")
    }

    fn statuses(store: &VersionStore) -> Vec<(u64, VersionStatus)> {
        store
            .versions(&key())
            .map(|v| (v.owner.0, v.status))
            .collect()
    }

    #[test]
    fn commit_appends_final_versions() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Update, 2, 3, "a"))
            .unwrap();
        let keys = store
            .finalize(&terminal(1, 2, OperationKind::Commit, 5, 6))
            .unwrap();
        assert_eq!(keys, vec![key()]);
        assert_eq!(
            statuses(&store),
            vec![
                (1, VersionStatus::Committed),
                (1, VersionStatus::Uncommitted),
                (0, VersionStatus::Initial)
            ]
        );
        let newest = store.versions(&key()).next().unwrap();
        assert_eq!(newest.interval, Interval::new(5, 6));
        assert!(store.has_writes(TransactionId(1)));
    }

    #[test]
    fn rollback_versions_are_born_checked() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Update, 2, 3, "a"))
            .unwrap();
        store
            .finalize(&terminal(1, 2, OperationKind::Rollback, 5, 6))
            .unwrap();
        let newest = store.versions(&key()).next().unwrap();
        assert_eq!(newest.status, VersionStatus::Rollback);
        assert!(newest.ww_checked);
    }

    #[test]
    fn delete_annihilates_own_insert() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Insert, 2, 3, "a"))
            .unwrap();
        store
            .ingest_write(&write(1, 2, OperationKind::Delete, 4, 5, "a"))
            .unwrap();
        assert!(!store.has_writes(TransactionId(1)));
        assert_eq!(statuses(&store), vec![(0, VersionStatus::Initial)]);
        let initial = store.versions(&key()).next().unwrap();
        assert_eq!(initial.image, RowImage::Absent);
    }

    #[test]
    fn update_of_own_insert_keeps_insert_semantics() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Insert, 2, 3, "a"))
            .unwrap();
        store
            .ingest_write(&write(1, 2, OperationKind::Update, 4, 5, "b"))
            .unwrap();
        let newest = store.versions(&key()).next().unwrap();
        assert_eq!(newest.producer, OperationKind::Insert);
        store
            .ingest_write(&write(1, 3, OperationKind::Delete, 6, 7, ""))
            .unwrap();
        assert!(!store.has_writes(TransactionId(1)));
        assert_eq!(statuses(&store), vec![(0, VersionStatus::Initial)]);
    }

    #[test]
    fn annihilated_writes_still_shadow_reads() {
        let mut store = VersionStore::default();
        let insert = write(1, 1, OperationKind::Insert, 2, 3, "a");
        let update = write(1, 2, OperationKind::Update, 4, 5, "b");
        let delete = write(1, 3, OperationKind::Delete, 6, 7, "");
        for record in [&insert, &update, &delete] {
            store.ingest_write(record).unwrap();
        }

        // the writes reach the head only after the delete was ingested
        store.record_own_write(&insert);
        let own = store.own_write(TransactionId(1), &key()).unwrap();
        assert_eq!(own.image, RowImage::Present([("v".into(), "a".into())].into_iter().collect()));

        store.record_own_write(&update);
        let own = store.own_write(TransactionId(1), &key()).unwrap();
        assert!(own.matches(&[("v".into(), "b".into())].into_iter().collect()));
        assert_eq!(own.producer, OperationKind::Insert);

        store.record_own_write(&delete);
        let own = store.own_write(TransactionId(1), &key()).unwrap();
        assert_eq!(own.image, RowImage::Absent);
    }

    #[test]
    fn ww_and_rw_follow_adjacent_commits() {
        let mut store = VersionStore::default();
        store.seed_initial(&TupleTrace::new("t", "x", [("v", "0")]));
        let initial = store.versions(&key()).next().unwrap().id;
        let reader = OpRef::new(TransactionId(9), OperationId(90));
        store
            .register_reader(initial, reader, &Values::new())
            .unwrap();

        store
            .ingest_write(&write(1, 1, OperationKind::Update, 2, 3, "a"))
            .unwrap();
        store
            .finalize(&terminal(1, 2, OperationKind::Commit, 4, 5))
            .unwrap();
        store
            .ingest_write(&write(2, 3, OperationKind::Update, 6, 7, "b"))
            .unwrap();
        store
            .finalize(&terminal(2, 4, OperationKind::Commit, 8, 9))
            .unwrap();

        let deps = store.track_ww(&key(), false);
        let edges: Vec<_> = deps
            .iter()
            .map(|d| (d.kind, d.from.transaction.0, d.to.transaction.0))
            .collect();
        assert_eq!(
            edges,
            vec![
                (DependencyKind::WW, 1, 2),
                (DependencyKind::RW, 9, 1),
            ]
        );
        assert!(store.track_ww(&key(), false).is_empty());

        // a reader registered after the successor is known learns it at once
        let first = store
            .versions(&key())
            .find(|v| v.owner == TransactionId(1) && v.is_committed())
            .unwrap()
            .id;
        let late = store
            .register_reader(first, OpRef::new(TransactionId(7), OperationId(70)), &Values::new())
            .unwrap();
        assert_eq!(late.successor.map(|s| s.transaction), Some(TransactionId(2)));
        assert!(!store.versions_settled(TransactionId(2)));
        store.track_ww(&key(), true);
        assert!(store.versions_settled(TransactionId(2)));
    }

    #[test]
    fn overlapping_commits_are_unordered() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Update, 1, 2, "a"))
            .unwrap();
        store
            .ingest_write(&write(2, 2, OperationKind::Update, 3, 4, "b"))
            .unwrap();
        store
            .finalize(&terminal(1, 3, OperationKind::Commit, 5, 9))
            .unwrap();
        store
            .finalize(&terminal(2, 4, OperationKind::Commit, 6, 8))
            .unwrap();
        assert!(store.track_ww(&key(), false).is_empty());
        assert!(!store.versions_settled(TransactionId(1)));
        store.track_ww(&key(), true);
        assert!(store.versions_settled(TransactionId(1)));
    }

    #[test]
    fn gc_keeps_chain_intervals_ordered_and_releases_writers() {
        let mut store = VersionStore::default();
        store.seed_initial(&TupleTrace::new("t", "x", [("v", "0")]));
        for (txn, base) in [(1_u64, 10_u64), (2, 20), (3, 30)] {
            store
                .ingest_write(&write(txn, txn * 10, OperationKind::Update, base, base + 1, "v"))
                .unwrap();
            store
                .finalize(&terminal(txn, txn * 10 + 1, OperationKind::Commit, base + 2, base + 3))
                .unwrap();
        }
        let report = store.collect_garbage(&key(), Interval::at(40), |_| false);
        assert_eq!(report.inferred.len(), 2);
        // the uncommitted and committed versions of T1 and T2 go, plus T3's pending one
        assert_eq!(report.removed, 5);
        let mut released = report.released.clone();
        released.sort();
        assert_eq!(released, vec![TransactionId(1), TransactionId(2)]);
        assert!(store.has_writes(TransactionId(3)));

        let starts: Vec<_> = store.versions(&key()).map(|v| v.interval.start).collect();
        assert!(starts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(
            statuses(&store),
            vec![(3, VersionStatus::Committed), (0, VersionStatus::Initial)]
        );
    }

    #[test]
    fn gc_leaves_no_overlapping_checked_commits() {
        let mut store = VersionStore::default();
        store.seed_initial(&TupleTrace::new("t", "x", [("v", "0")]));
        for (txn, at) in [(1_u64, 1_u64), (2, 3), (3, 5), (4, 7)] {
            store
                .ingest_write(&write(txn, txn * 10, OperationKind::Update, at, at + 1, "v"))
                .unwrap();
        }
        store
            .finalize(&terminal(1, 11, OperationKind::Commit, 10, 11))
            .unwrap();
        store
            .finalize(&terminal(2, 21, OperationKind::Rollback, 12, 13))
            .unwrap();
        // T3 and T4 commit concurrently
        store
            .finalize(&terminal(3, 31, OperationKind::Commit, 14, 18))
            .unwrap();
        store
            .finalize(&terminal(4, 41, OperationKind::Commit, 15, 17))
            .unwrap();
        store
            .ingest_write(&write(5, 50, OperationKind::Update, 20, 21, "v"))
            .unwrap();
        store
            .finalize(&terminal(5, 51, OperationKind::Commit, 22, 23))
            .unwrap();

        let report = store.collect_garbage(&key(), Interval::at(16), |_| false);
        assert_eq!(report.removed, 4);

        let checked: Vec<&Version> = store
            .versions(&key())
            .filter(|v| {
                v.ww_checked
                    && matches!(v.status, VersionStatus::Committed | VersionStatus::Rollback)
            })
            .collect();
        assert_eq!(checked.len(), 3);
        for (i, a) in checked.iter().enumerate() {
            for b in &checked[i + 1..] {
                assert!(
                    !a.interval.overlaps(&b.interval),
                    "{a:?} overlaps {b:?}"
                );
            }
        }
        // the concurrent pair survives with its order left open
        let t3 = store
            .versions(&key())
            .find(|v| v.owner == TransactionId(3) && v.is_committed())
            .unwrap();
        assert!(!t3.ww_checked);
        assert!(store
            .versions(&key())
            .any(|v| v.status == VersionStatus::Rollback));
    }

    #[test]
    fn gc_spares_pending_writes_of_active_transactions() {
        let mut store = VersionStore::default();
        store
            .ingest_write(&write(1, 1, OperationKind::Update, 1, 2, "a"))
            .unwrap();
        store
            .finalize(&terminal(1, 2, OperationKind::Commit, 3, 4))
            .unwrap();
        store
            .ingest_write(&write(2, 3, OperationKind::Update, 5, 6, "b"))
            .unwrap();
        store
            .ingest_write(&write(3, 4, OperationKind::Update, 7, 8, "c"))
            .unwrap();
        // T1's committed version is the pivot; its pending write is the only garbage
        let report =
            store.collect_garbage(&key(), Interval::at(10), |t| t == TransactionId(2));
        assert_eq!(report.removed, 1);
        assert!(store
            .versions(&key())
            .any(|v| v.owner == TransactionId(2)));
    }

    #[test]
    fn own_writes_shadow_the_chain() {
        let mut store = VersionStore::default();
        let w = write(1, 1, OperationKind::Update, 2, 3, "a");
        store.ingest_write(&w).unwrap();
        store.record_own_write(&w);
        let own = store.own_write(TransactionId(1), &key()).unwrap();
        assert!(own.matches(&[("v".into(), "a".into())].into_iter().collect()));
        store.drop_own_writes(TransactionId(1));
        assert!(store.own_write(TransactionId(1), &key()).is_none());
    }
}

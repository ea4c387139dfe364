use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use super::cycle::{bounded_circuits, strongly_connected_component};
use super::{Dependency, DependencyKind, EdgeTags, RetentionOracle};
use crate::trace::{Interval, Timestamp, TransactionId};

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    pub transaction: TransactionId,
    /// From begin to end, open-ended until the transaction finishes.
    pub lifetime: Interval,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Edge {
    tags: EdgeTags,
    /// First piece of evidence per kind.
    evidence: Vec<Dependency>,
}

impl Edge {
    fn add(&mut self, dependency: Dependency) -> bool {
        if self.tags.insert(dependency.kind) {
            self.evidence.push(dependency);
            true
        } else {
            false
        }
    }
}

/// One edge of a reported cycle.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge {
    pub from: TransactionId,
    pub to: TransactionId,
    pub tags: EdgeTags,
    pub evidence: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// An endpoint is not (or no longer) a vertex, or the edge is a self-loop.
    Dropped,
    /// The endpoints never ran concurrently and such edges are skipped.
    NonConcurrent,
    /// The edge existed; its tag set may have grown.
    Merged,
    /// A new edge, with every cycle of bounded length through it.
    Inserted { cycles: Vec<Vec<CycleEdge>> },
}

/// Directed graph over transactions, with per-edge dependency tags.
///
/// Cycles are searched for incrementally: only when a new edge appears, and
/// only among cycles through that edge. Vertices that can no longer lie on
/// any cycle are pruned once the graph outgrows its threshold.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    vertices: HashMap<TransactionId, Vertex>,
    adj_map: HashMap<TransactionId, HashMap<TransactionId, Edge>>,
    /// Reverse adjacency, for in-degrees and vertex removal.
    inc_map: HashMap<TransactionId, HashSet<TransactionId>>,
    edge_count: usize,
    max_cycle_length: usize,
    prune_threshold: usize,
    skip_non_concurrent: bool,
}

impl DependencyGraph {
    #[must_use]
    pub fn new(max_cycle_length: usize, prune_threshold: usize, skip_non_concurrent: bool) -> Self {
        Self {
            max_cycle_length,
            prune_threshold,
            skip_non_concurrent,
            ..Self::default()
        }
    }

    /// Adds the vertex of a freshly started transaction, pruning first if
    /// the graph has outgrown its threshold. Returns the pruned vertices.
    pub fn add_profile<O: RetentionOracle>(
        &mut self,
        transaction: TransactionId,
        begin: Interval,
        oracle: &O,
    ) -> Vec<TransactionId> {
        self.vertices.insert(
            transaction,
            Vertex {
                transaction,
                lifetime: Interval::new(begin.start, Timestamp::MAX),
                completed: false,
            },
        );
        if self.vertices.len() > self.prune_threshold {
            self.prune(oracle)
        } else {
            Vec::new()
        }
    }

    /// Records the end of a transaction's lifetime.
    pub fn complete(&mut self, transaction: TransactionId, end: Interval) {
        if let Some(vertex) = self.vertices.get_mut(&transaction) {
            vertex.lifetime.finish = end.finish;
            vertex.completed = true;
        }
    }

    pub fn add_dependency(&mut self, dependency: Dependency) -> EdgeOutcome {
        let from = dependency.from.transaction;
        let to = dependency.to.transaction;
        if from == to {
            return EdgeOutcome::Dropped;
        }
        let (Some(source), Some(target)) = (self.vertices.get(&from), self.vertices.get(&to))
        else {
            return EdgeOutcome::Dropped;
        };
        if self.skip_non_concurrent && !source.lifetime.overlaps(&target.lifetime) {
            return EdgeOutcome::NonConcurrent;
        }

        let edges = self.adj_map.entry(from).or_default();
        if let Some(edge) = edges.get_mut(&to) {
            edge.add(dependency);
            return EdgeOutcome::Merged;
        }
        let mut edge = Edge::default();
        edge.add(dependency);
        edges.insert(to, edge);
        self.inc_map.entry(to).or_default().insert(from);
        self.edge_count += 1;

        EdgeOutcome::Inserted {
            cycles: self.cycles_through(from, to),
        }
    }

    fn successors(&self, vertex: TransactionId) -> impl Iterator<Item = TransactionId> + '_ {
        self.adj_map
            .get(&vertex)
            .into_iter()
            .flat_map(|edges| edges.keys().copied())
    }

    fn cycles_through(&self, from: TransactionId, to: TransactionId) -> Vec<Vec<CycleEdge>> {
        let component = strongly_connected_component(from, move |v| self.successors(v));
        if !component.contains(&to) {
            return Vec::new();
        }
        bounded_circuits(from, to, self.max_cycle_length, &component, move |v| {
            self.successors(v)
        })
        .into_iter()
        .map(|path| self.describe(&path))
        .collect()
    }

    fn describe(&self, path: &[TransactionId]) -> Vec<CycleEdge> {
        let closing = path.first().zip(path.last());
        path.windows(2)
            .map(|pair| (pair[0], pair[1]))
            .chain(closing.map(|(first, last)| (*last, *first)))
            .filter_map(|(from, to)| {
                let edge = self.adj_map.get(&from)?.get(&to)?;
                Some(CycleEdge {
                    from,
                    to,
                    tags: edge.tags.clone(),
                    evidence: edge.evidence.clone(),
                })
            })
            .collect()
    }

    /// Removes, until none is left, every vertex that is inactive, ended
    /// before the earliest active transaction began, has all its versions
    /// settled and has no incoming edge.
    pub fn prune<O: RetentionOracle>(&mut self, oracle: &O) -> Vec<TransactionId> {
        let horizon = oracle.earliest_active_begin().unwrap_or(Timestamp::MAX);
        let mut pruned = Vec::new();
        loop {
            let batch: Vec<TransactionId> = self
                .vertices
                .values()
                .filter(|vertex| {
                    vertex.completed
                        && vertex.lifetime.finish < horizon
                        && !oracle.is_active(vertex.transaction)
                        && oracle.versions_settled(vertex.transaction)
                        && self.in_degree(vertex.transaction) == 0
                })
                .map(|vertex| vertex.transaction)
                .collect();
            if batch.is_empty() {
                break;
            }
            for transaction in &batch {
                self.remove_vertex(*transaction);
            }
            pruned.extend(batch);
        }
        if !pruned.is_empty() {
            tracing::debug!(
                pruned = pruned.len(),
                remaining = self.vertices.len(),
                "pruned dependency graph"
            );
        }
        pruned
    }

    fn remove_vertex(&mut self, transaction: TransactionId) {
        self.vertices.remove(&transaction);
        if let Some(edges) = self.adj_map.remove(&transaction) {
            self.edge_count -= edges.len();
            for target in edges.keys() {
                if let Some(sources) = self.inc_map.get_mut(target) {
                    sources.remove(&transaction);
                }
            }
        }
        if let Some(sources) = self.inc_map.remove(&transaction) {
            for source in sources {
                if let Some(edges) = self.adj_map.get_mut(&source) {
                    if edges.remove(&transaction).is_some() {
                        self.edge_count -= 1;
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn contains(&self, transaction: TransactionId) -> bool {
        self.vertices.contains_key(&transaction)
    }

    #[must_use]
    pub fn vertex(&self, transaction: TransactionId) -> Option<&Vertex> {
        self.vertices.get(&transaction)
    }

    #[must_use]
    pub fn has_edge(&self, from: TransactionId, to: TransactionId) -> bool {
        self.adj_map
            .get(&from)
            .is_some_and(|edges| edges.contains_key(&to))
    }

    /// Tags of the edge `from -> to`, if any.
    #[must_use]
    pub fn tags(&self, from: TransactionId, to: TransactionId) -> Option<&EdgeTags> {
        self.adj_map.get(&from)?.get(&to).map(|edge| &edge.tags)
    }

    #[must_use]
    pub fn has_tag(&self, from: TransactionId, to: TransactionId, kind: DependencyKind) -> bool {
        self.tags(from, to).is_some_and(|tags| tags.contains(&kind))
    }

    #[must_use]
    pub fn in_degree(&self, transaction: TransactionId) -> usize {
        self.inc_map.get(&transaction).map_or(0, HashSet::len)
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }
}

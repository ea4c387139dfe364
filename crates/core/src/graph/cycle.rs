//! Incremental cycle search.
//!
//! When an edge `u -> v` is added, every new cycle passes through it. The
//! search first narrows the graph to the strongly connected component of `u`
//! (Tarjan, iterative), then enumerates elementary circuits that begin with
//! `u -> v` in the style of Johnson's algorithm, bounded in length.

use alloc::vec;
use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

/// The strongly connected component containing `source`.
pub fn strongly_connected_component<T, F, I>(source: T, successors: F) -> HashSet<T>
where
    T: Copy + Eq + Hash,
    F: Fn(T) -> I,
    I: IntoIterator<Item = T>,
{
    let mut counter = 0_usize;
    let mut index: HashMap<T, usize> = HashMap::new();
    let mut low: HashMap<T, usize> = HashMap::new();
    let mut on_stack: HashSet<T> = HashSet::new();
    let mut stack: Vec<T> = Vec::new();
    let mut work: Vec<(T, Vec<T>, usize)> = Vec::new();

    index.insert(source, counter);
    low.insert(source, counter);
    counter += 1;
    stack.push(source);
    on_stack.insert(source);
    work.push((source, successors(source).into_iter().collect(), 0));

    while let Some((v, next, cursor)) = work.last_mut() {
        let v = *v;
        if let Some(&w) = next.get(*cursor) {
            *cursor += 1;
            match index.get(&w) {
                None => {
                    index.insert(w, counter);
                    low.insert(w, counter);
                    counter += 1;
                    stack.push(w);
                    on_stack.insert(w);
                    let next = successors(w).into_iter().collect();
                    work.push((w, next, 0));
                }
                Some(&w_index) if on_stack.contains(&w) => {
                    if let Some(v_low) = low.get_mut(&v) {
                        *v_low = (*v_low).min(w_index);
                    }
                }
                Some(_) => {}
            }
            continue;
        }

        work.pop();
        let v_low = low[&v];
        if let Some((parent, _, _)) = work.last() {
            if let Some(parent_low) = low.get_mut(parent) {
                *parent_low = (*parent_low).min(v_low);
            }
        }
        if v_low == index[&v] {
            let mut component = HashSet::new();
            while let Some(w) = stack.pop() {
                on_stack.remove(&w);
                component.insert(w);
                if w == v {
                    break;
                }
            }
            if component.contains(&source) {
                return component;
            }
        }
    }
    HashSet::from_iter([source])
}

struct Circuits<'a, T, F> {
    start: T,
    max_len: usize,
    within: &'a HashSet<T>,
    successors: F,
    blocked: HashSet<T>,
    blocked_by: HashMap<T, HashSet<T>>,
    path: Vec<T>,
    found: Vec<Vec<T>>,
}

impl<T, F, I> Circuits<'_, T, F>
where
    T: Copy + Eq + Hash,
    F: Fn(T) -> I,
    I: IntoIterator<Item = T>,
{
    fn next(&self, v: T) -> Vec<T> {
        (self.successors)(v)
            .into_iter()
            .filter(|w| self.within.contains(w))
            .collect()
    }

    /// Returns `true` if some circuit closed below `v`, or the length bound
    /// cut the search short; either way `v` must not stay blocked.
    fn circuit(&mut self, v: T) -> bool {
        let mut closed = false;
        self.path.push(v);
        self.blocked.insert(v);

        let next = self.next(v);
        for &w in &next {
            if w == self.start {
                self.found.push(self.path.clone());
                closed = true;
            } else if !self.blocked.contains(&w) {
                if self.path.len() < self.max_len {
                    closed |= self.circuit(w);
                } else {
                    closed = true;
                }
            }
        }

        if closed {
            self.unblock(v);
        } else {
            for w in next {
                self.blocked_by.entry(w).or_default().insert(v);
            }
        }
        self.path.pop();
        closed
    }

    fn unblock(&mut self, v: T) {
        let mut pending = vec![v];
        while let Some(u) = pending.pop() {
            if self.blocked.remove(&u) {
                if let Some(waiting) = self.blocked_by.remove(&u) {
                    pending.extend(waiting);
                }
            }
        }
    }
}

/// Elementary circuits of at most `max_len` edges whose first edge is
/// `start -> first`, restricted to vertices in `within`.
///
/// Each circuit is returned as its vertex sequence beginning with `start`;
/// the closing edge back to `start` is implied.
pub fn bounded_circuits<T, F, I>(
    start: T,
    first: T,
    max_len: usize,
    within: &HashSet<T>,
    successors: F,
) -> Vec<Vec<T>>
where
    T: Copy + Eq + Hash,
    F: Fn(T) -> I,
    I: IntoIterator<Item = T>,
{
    if max_len < 2 || start == first || !within.contains(&first) {
        return Vec::new();
    }
    let mut search = Circuits {
        start,
        max_len,
        within,
        successors,
        blocked: HashSet::from_iter([start]),
        blocked_by: HashMap::new(),
        path: vec![start],
        found: Vec::new(),
    };
    search.circuit(first);
    search.found
}

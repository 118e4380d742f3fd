//! Descendant closure over the reader hierarchy.

use common::ReaderKey;
use std::collections::{HashSet, VecDeque};

/// Returns every reader key reachable from `seed` through sub-readers,
/// breadth-first, excluding `seed` itself.
///
/// # Algorithm
/// Frontier queue seeded with `seed`; each popped key appends its immediate
/// sub-reader keys in order. Childless keys contribute nothing.
///
/// Every key is enqueued at most once, so a reader shared by several parents
/// of a DAG is listed and expanded once and the walk stays linear in the
/// number of edges.
pub fn descendant_reader_keys(seed: &ReaderKey) -> Vec<ReaderKey> {
    let mut descendants = Vec::new();
    let mut enqueued: HashSet<ReaderKey> = HashSet::new();
    let mut queue = VecDeque::new();
    enqueued.insert(seed.clone());
    queue.push_back(seed.clone());

    while let Some(key) = queue.pop_front() {
        for child in key.sub_reader_keys() {
            if enqueued.insert(child.clone()) {
                descendants.push(child.clone());
                queue.push_back(child);
            }
        }
    }

    descendants
}

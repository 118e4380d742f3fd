//! Key → set-of-values multimap.
//!
//! Both analyzer indices are instances of this: value identity → entry
//! positions, and `ReaderField` → value identities. Insertion order is
//! preserved so findings come out in a stable order.

use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Multimap with set semantics per key.
#[derive(Debug, Clone)]
pub struct MapOfSets<K, V> {
    map: IndexMap<K, IndexSet<V>>,
}

impl<K: Hash + Eq, V: Hash + Eq> MapOfSets<K, V> {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Adds `value` under `key` and returns how many distinct values `key` now has.
    ///
    /// Re-inserting an existing pair changes nothing.
    pub fn put(&mut self, key: K, value: V) -> usize {
        let set = self.map.entry(key).or_default();
        set.insert(value);
        set.len()
    }

    /// Merges every value of `values` under `key`; returns the new distinct count.
    pub fn put_all<I>(&mut self, key: K, values: I) -> usize
    where
        I: IntoIterator<Item = V>,
    {
        let set = self.map.entry(key).or_default();
        set.extend(values);
        set.len()
    }

    pub fn get(&self, key: &K) -> Option<&IndexSet<V>> {
        self.map.get(key)
    }

    /// Values under `key`; empty for unknown keys.
    pub fn values<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a V> + 'a {
        self.map.get(key).into_iter().flatten()
    }

    /// Number of distinct values under `key`.
    pub fn count(&self, key: &K) -> usize {
        self.map.get(key).map_or(0, IndexSet::len)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &IndexSet<V>)> {
        self.map.iter()
    }

    /// Removes `key` and returns its set. Remaining keys keep their order.
    pub fn remove(&mut self, key: &K) -> Option<IndexSet<V>> {
        self.map.shift_remove(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Hash + Eq, V: Hash + Eq> Default for MapOfSets<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_counts_distinct_values() {
        let mut map = MapOfSets::new();
        assert_eq!(map.put("a", 1), 1);
        assert_eq!(map.put("a", 2), 2);
        assert_eq!(map.put("a", 1), 2);
        assert_eq!(map.put("b", 1), 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_put_all_merges() {
        let mut map = MapOfSets::new();
        map.put("a", 1);
        assert_eq!(map.put_all("a", [1, 2, 3]), 3);
        assert_eq!(map.put_all("b", Vec::<i32>::new()), 0);
        assert!(map.contains_key(&"b"));
    }

    #[test]
    fn test_unknown_key_reads_empty() {
        let map: MapOfSets<&str, i32> = MapOfSets::new();
        assert!(map.get(&"missing").is_none());
        assert_eq!(map.values(&"missing").count(), 0);
        assert_eq!(map.count(&"missing"), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut map = MapOfSets::new();
        map.put("a", 1);
        map.put("b", 2);
        map.put("c", 3);

        let removed = map.remove(&"b").unwrap();
        assert!(removed.contains(&2));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_values_in_insertion_order() {
        let mut map = MapOfSets::new();
        map.put("k", 3);
        map.put("k", 1);
        map.put("k", 2);
        assert_eq!(map.values(&"k").copied().collect::<Vec<_>>(), vec![3, 1, 2]);
    }
}

//! Reconciliation cache.
//!
//! Streaming deltas trigger a recomputation many times per second. The cache
//! remembers everything already resolved for the active thread so each pass
//! only does lookups for keys it has not seen. Entries are never evicted;
//! the owning session drops the whole cache on thread switch.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Split of a key list into cached and pending keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<K> {
    /// Distinct keys in first-seen order.
    pub ordered: Vec<K>,
    /// Keys from `ordered` that are not cached yet, same order.
    pub pending: Vec<K>,
}

impl<K> ReconcilePlan<K> {
    pub fn is_fully_cached(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn reused_count(&self) -> usize {
        self.ordered.len() - self.pending.len()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for ReconciliationCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> ReconciliationCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Deduplicate `keys` and mark which of them still need resolving.
    pub fn plan(&self, keys: impl IntoIterator<Item = K>) -> ReconcilePlan<K> {
        let mut seen = HashSet::new();
        let ordered: Vec<K> = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();
        let pending = ordered
            .iter()
            .filter(|key| !self.entries.contains_key(*key))
            .cloned()
            .collect();
        ReconcilePlan { ordered, pending }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Drop one entry so the next pass resolves it again.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    /// Drop every entry matching `predicate`; returns how many were dropped.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, v| !predicate(k, v));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> Extend<(K, V)> for ReconciliationCache<K, V>
where
    K: Eq + Hash,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

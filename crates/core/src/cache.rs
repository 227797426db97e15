//! Per-run memoization of resolved resources
//!
//! A [`ResourceCache`] lives exactly as long as the suite that created it.
//! Entries are written once per key and never invalidated: the cache only
//! saves repeated list/create round trips, the backend remains authoritative.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::trace;

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`, 0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Write-once memoization table keyed by a selector string
///
/// Selectors are compared case-insensitively, matching the case-insensitive
/// predicates used to resolve resources.
#[derive(Debug)]
pub struct ResourceCache<T> {
    name: &'static str,
    entries: HashMap<String, T>,
    stats: CacheStats,
}

impl<T> ResourceCache<T>
where
    T: Clone + Debug,
{
    /// Create an empty cache; `name` only appears in logs
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn key(selector: &str) -> String {
        selector.to_lowercase()
    }

    /// Look up a prior resolution
    pub fn get(&mut self, selector: &str) -> Option<T> {
        match self.entries.get(&Self::key(selector)) {
            Some(value) => {
                self.stats.hits += 1;
                trace!(cache = self.name, selector, "Cache hit");
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                trace!(cache = self.name, selector, "Cache miss");
                None
            }
        }
    }

    /// Store a resolution; an existing entry for the selector is kept
    pub fn insert(&mut self, selector: &str, value: T) -> T {
        let name = self.name;
        self.entries
            .entry(Self::key(selector))
            .or_insert_with(|| {
                trace!(cache = name, selector, ?value, "Cache entry stored");
                value
            })
            .clone()
    }

    /// Number of cached selectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}

//! Cache Status Module
//!
//! Running accounting of what the cache holds, plus hit/miss/eviction counters.

use serde::Serialize;

// == Cache Status ==
/// Accounting tuple updated together with every insert, update and removal.
///
/// `key_bytes` and `value_bytes` always equal the sums over live entries.
/// A `limit_bytes` of zero means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatus {
    /// Number of live entries
    pub count: u64,
    /// Sum of UTF-8 byte lengths of live keys
    pub key_bytes: u64,
    /// Sum of byte lengths of live values
    pub value_bytes: u64,
    /// Value byte budget, 0 = unbounded
    pub limit_bytes: u64,
    /// Number of gets that found their key
    pub hits: u64,
    /// Number of gets that did not
    pub misses: u64,
    /// Number of entries removed to satisfy the limit
    pub evictions: u64,
}

impl CacheStatus {
    // == Constructor ==
    pub fn new(limit_bytes: u64) -> Self {
        Self {
            limit_bytes,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no gets have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// True when a limit is set and the value bytes exceed it.
    pub fn is_overflow(&self) -> bool {
        self.limit_bytes > 0 && self.value_bytes > self.limit_bytes
    }

    pub(crate) fn record_insert(&mut self, key_len: u64, value_len: u64) {
        self.count += 1;
        self.key_bytes += key_len;
        self.value_bytes += value_len;
    }

    pub(crate) fn record_update(&mut self, old_value_len: u64, new_value_len: u64) {
        self.value_bytes = self.value_bytes - old_value_len + new_value_len;
    }

    pub(crate) fn record_remove(&mut self, key_len: u64, value_len: u64) {
        self.count -= 1;
        self.key_bytes -= key_len;
        self.value_bytes -= value_len;
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_eviction(&mut self) {
        self.evictions += 1;
    }
}

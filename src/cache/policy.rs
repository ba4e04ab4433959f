//! Eviction Policy Module
//!
//! The recency bookkeeping a cache backend plugs in. The cache owns the
//! key index and the accounting; the policy only decides which key goes
//! first when the cache is over budget.

use super::LruTracker;

// == Eviction Policy ==
pub trait EvictionPolicy: Default + Send {
    /// Whether this policy honours a byte limit at all.
    const BOUNDED: bool;

    /// Records an insert or an access of `key`.
    fn touch(&mut self, key: &str);

    /// Forgets `key` after it was deleted.
    fn remove(&mut self, key: &str);

    /// Picks and forgets the next key to evict.
    fn evict_next(&mut self) -> Option<String>;
}

impl EvictionPolicy for LruTracker {
    const BOUNDED: bool = true;

    fn touch(&mut self, key: &str) {
        LruTracker::touch(self, key);
    }

    fn remove(&mut self, key: &str) {
        LruTracker::remove(self, key);
    }

    fn evict_next(&mut self) -> Option<String> {
        self.evict_oldest()
    }
}

// == Unbounded ==
/// No ordering and no eviction; the limit is pinned to zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    const BOUNDED: bool = false;

    fn touch(&mut self, _key: &str) {}

    fn remove(&mut self, _key: &str) {}

    fn evict_next(&mut self) -> Option<String> {
        None
    }
}

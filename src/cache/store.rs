//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with a pluggable eviction
//! policy and byte accounting.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{
    CacheEntry, CacheStatus, EvictReason, EvictionPolicy, LruTracker, Sizeable, Unbounded,
};

/// Hook invoked for every entry leaving the cache.
pub type EvictHook<V> = Box<dyn Fn(&str, &V, EvictReason) + Send + Sync>;

/// Byte-bounded cache evicting least recently used entries first.
pub type LruCache<V> = Cache<V, LruTracker>;

/// Unordered cache without eviction.
pub type MapCache<V> = Cache<V, Unbounded>;

// == Store ==
/// Backend-independent cache contract.
///
/// Lets callers hold an `Arc<dyn Store<V>>` and swap between [`LruCache`]
/// and [`MapCache`] without code changes.
pub trait Store<V>: Send + Sync {
    fn set(&self, key: String, value: V);
    fn get(&self, key: &str) -> Option<V>;
    fn delete(&self, key: &str) -> bool;
    fn status(&self) -> CacheStatus;
}

// == Cache ==
/// Key/value store with exact byte accounting.
///
/// Every public method takes the internal lock for its whole mutation,
/// including `get`, which reorders recency. Eviction hooks run after the
/// lock is released but before the triggering call returns, so a hook sees
/// the entry already gone and may call back into the cache.
pub struct Cache<V, P = LruTracker> {
    inner: Mutex<Inner<V, P>>,
    on_evict: Option<EvictHook<V>>,
}

struct Inner<V, P> {
    entries: HashMap<String, V>,
    policy: P,
    status: CacheStatus,
}

impl<V, P> Inner<V, P>
where
    V: Sizeable,
    P: EvictionPolicy,
{
    /// Evicts from the back of the policy until the value bytes fit.
    ///
    /// Stops early if the policy runs dry; the status may then remain over
    /// a freshly lowered limit until the next mutation.
    fn evict_overflow(&mut self) -> Vec<CacheEntry<V>> {
        let mut evicted = Vec::new();
        while self.status.is_overflow() {
            let Some(key) = self.policy.evict_next() else {
                break;
            };
            if let Some(value) = self.entries.remove(&key) {
                let entry = CacheEntry::new(key, value);
                self.status.record_remove(entry.key_len(), entry.value_len());
                self.status.record_eviction();
                evicted.push(entry);
            }
        }
        evicted
    }
}

impl<V, P> Cache<V, P>
where
    V: Sizeable,
    P: EvictionPolicy,
{
    // == Constructor ==
    /// Creates a cache holding at most `limit_bytes` of values.
    ///
    /// A limit of 0 means unbounded. Policies that never evict ignore the
    /// limit and report 0.
    ///
    /// # Arguments
    /// * `limit_bytes` - Budget for the summed byte length of all values
    pub fn new(limit_bytes: u64) -> Self {
        let limit_bytes = if P::BOUNDED { limit_bytes } else { 0 };
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                policy: P::default(),
                status: CacheStatus::new(limit_bytes),
            }),
            on_evict: None,
        }
    }

    /// Registers the hook called for every evicted or deleted entry.
    pub fn with_evict_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &V, EvictReason) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(hook));
        self
    }

    // == Set ==
    /// Stores a value, replacing and promoting an existing entry.
    ///
    /// Evicts least recently used entries until the value bytes are back
    /// under the limit, possibly including the entry just written.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store, sized through [`Sizeable`]
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let evicted = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let new_len = value.byte_len();

            match inner.entries.get_mut(&key) {
                Some(slot) => {
                    inner.status.record_update(slot.byte_len(), new_len);
                    *slot = value;
                }
                None => {
                    inner.status.record_insert(key.len() as u64, new_len);
                    inner.entries.insert(key.clone(), value);
                }
            }
            inner.policy.touch(&key);
            inner.evict_overflow()
        };
        self.notify(evicted, EvictReason::Capacity);
    }

    // == Delete ==
    /// Removes the entry for `key`. Returns false if there was none.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.entries.remove(key).map(|value| {
                let entry = CacheEntry::new(key.to_string(), value);
                inner.policy.remove(key);
                inner.status.record_remove(entry.key_len(), entry.value_len());
                entry
            })
        };

        match removed {
            Some(entry) => {
                self.notify(vec![entry], EvictReason::Deleted);
                true
            }
            None => false,
        }
    }

    /// Checks for a key without promoting it.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    // == Status ==
    /// Returns a snapshot of the accounting.
    pub fn status(&self) -> CacheStatus {
        self.inner.lock().status.clone()
    }

    /// Changes the value byte budget.
    ///
    /// The new limit is enforced by the next `set`. Unbounded caches keep 0.
    pub fn set_limit_bytes(&self, limit_bytes: u64) {
        if P::BOUNDED {
            self.inner.lock().status.limit_bytes = limit_bytes;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn notify(&self, entries: Vec<CacheEntry<V>>, reason: EvictReason) {
        for entry in entries {
            debug!(key = %entry.key, bytes = entry.value_len(), ?reason, "Cache entry removed");
            if let Some(hook) = &self.on_evict {
                hook(&entry.key, &entry.value, reason);
            }
        }
    }
}

impl<V, P> Cache<V, P>
where
    V: Sizeable + Clone,
    P: EvictionPolicy,
{
    // == Get ==
    /// Returns a copy of the value and promotes the entry.
    ///
    /// `None` means the key is absent, as opposed to present with an
    /// empty value.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.entries.get(key) {
            Some(value) => {
                let value = value.clone();
                inner.policy.touch(key);
                inner.status.record_hit();
                Some(value)
            }
            None => {
                inner.status.record_miss();
                None
            }
        }
    }
}

impl<V, P> Default for Cache<V, P>
where
    V: Sizeable,
    P: EvictionPolicy,
{
    fn default() -> Self {
        Self::new(0)
    }
}

impl<V, P> fmt::Debug for Cache<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("status", &self.inner.lock().status)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

impl<V, P> Store<V> for Cache<V, P>
where
    V: Sizeable + Clone + Send,
    P: EvictionPolicy,
{
    fn set(&self, key: String, value: V) {
        Cache::set(self, key, value);
    }

    fn get(&self, key: &str) -> Option<V> {
        Cache::get(self, key)
    }

    fn delete(&self, key: &str) -> bool {
        Cache::delete(self, key)
    }

    fn status(&self) -> CacheStatus {
        Cache::status(self)
    }
}

//! Cache Module
//!
//! Provides the node-local in-memory store: a byte-budgeted cache with a
//! pluggable eviction policy (LRU or none) and an eviction hook.

mod entry;
mod lru;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, EvictReason, Sizeable};
pub use lru::LruTracker;
pub use policy::{EvictionPolicy, Unbounded};
pub use stats::CacheStatus;
pub use store::{Cache, EvictHook, LruCache, MapCache, Store};

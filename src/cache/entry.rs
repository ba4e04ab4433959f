//! Cache Entry Module
//!
//! Defines the sizing capability every cached value provides and the
//! entry handed to eviction hooks.

use bytes::Bytes;

// == Sizeable ==
/// Byte length a value contributes to the cache's value budget.
pub trait Sizeable {
    fn byte_len(&self) -> u64;
}

impl Sizeable for Vec<u8> {
    fn byte_len(&self) -> u64 {
        self.len() as u64
    }
}

impl Sizeable for Box<[u8]> {
    fn byte_len(&self) -> u64 {
        self.len() as u64
    }
}

impl Sizeable for Bytes {
    fn byte_len(&self) -> u64 {
        self.len() as u64
    }
}

impl Sizeable for String {
    fn byte_len(&self) -> u64 {
        self.len() as u64
    }
}

// == Evict Reason ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Removed to bring the value bytes back under the limit
    Capacity,
    /// Removed by an explicit delete
    Deleted,
}

// == Cache Entry ==
/// A key/value pair removed from the cache.
///
/// The cache owns entries while they are live; once evicted or deleted
/// they are moved out as a `CacheEntry` and handed to the eviction hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
}

impl<V: Sizeable> CacheEntry<V> {
    pub fn new(key: String, value: V) -> Self {
        Self { key, value }
    }

    /// Bytes the key contributes to `key_bytes`.
    pub fn key_len(&self) -> u64 {
        self.key.len() as u64
    }

    /// Bytes the value contributes to `value_bytes`.
    pub fn value_len(&self) -> u64 {
        self.value.byte_len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizeable_impls() {
        assert_eq!(vec![0u8; 6].byte_len(), 6);
        assert_eq!(Bytes::from_static(b"hello").byte_len(), 5);
        assert_eq!("héllo".to_string().byte_len(), 6);
        assert_eq!(vec![1u8, 2].into_boxed_slice().byte_len(), 2);
    }

    #[test]
    fn test_entry_lengths_use_utf8_bytes() {
        let entry = CacheEntry::new("ключ".to_string(), vec![0u8; 3]);
        assert_eq!(entry.key_len(), 8);
        assert_eq!(entry.value_len(), 3);
    }
}

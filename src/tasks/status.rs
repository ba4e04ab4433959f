//! Cache Status Reporter
//!
//! Background task that periodically logs the node-local store's accounting.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Store;

/// Spawns a task logging the store's [`crate::cache::CacheStatus`] every
/// `interval`.
///
/// The task only reads the status, never mutates the store. It runs until
/// the returned handle is aborted.
///
/// # Arguments
/// * `store` - Shared store whose status is reported
/// * `interval` - Time between reports
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_status_reporter<V: 'static>(
    store: Arc<dyn Store<V>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting cache status reporter every {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let status = store.status();
            if status.count == 0 && status.hits + status.misses == 0 {
                debug!("Cache status: idle");
                continue;
            }
            info!(
                entries = status.count,
                key_bytes = status.key_bytes,
                value_bytes = status.value_bytes,
                limit_bytes = status.limit_bytes,
                evictions = status.evictions,
                "Cache status: hit rate {:.1}%",
                status.hit_rate() * 100.0
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LruCache, MapCache};

    #[tokio::test]
    async fn test_reporter_leaves_store_untouched() {
        let cache: Arc<LruCache<String>> = Arc::new(LruCache::new(100));
        cache.set("a", "value".to_string());

        let handle = spawn_status_reporter::<String>(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = cache.status();
        assert_eq!(status.count, 1);
        assert_eq!(status.hits + status.misses, 0);
        assert_eq!(cache.get("a"), Some("value".to_string()));

        handle.abort();
    }

    #[tokio::test]
    async fn test_reporter_accepts_any_backend() {
        let store: Arc<dyn Store<Vec<u8>>> = Arc::new(MapCache::new(0));
        store.set("k".to_string(), vec![1, 2, 3]);

        let handle = spawn_status_reporter(store, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_reporter_can_be_aborted() {
        let cache: Arc<MapCache<String>> = Arc::new(MapCache::new(0));

        let handle = spawn_status_reporter::<String>(cache, Duration::from_secs(1));

        // Abort immediately
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}

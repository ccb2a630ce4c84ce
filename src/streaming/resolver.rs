//! Descriptor lookup with a wholesale-cleared cache.

use crate::backend::BackendIdentity;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use streamgate_common::{Error, FileDescriptor, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const MIN_CLEAR_INTERVAL: Duration = Duration::from_secs(1);

/// Resolves `(store_id, message_id)` pairs for one identity.
pub struct FileResolver {
    identity: Arc<dyn BackendIdentity>,
    cache: DashMap<(i64, i64), FileDescriptor>,
}

impl FileResolver {
    pub fn new(identity: Arc<dyn BackendIdentity>) -> Self {
        Self {
            identity,
            cache: DashMap::new(),
        }
    }

    /// Cached descriptor, or a fresh lookup through the identity.
    pub async fn resolve(&self, store_id: i64, message_id: i64) -> Result<FileDescriptor> {
        if let Some(descriptor) = self.cache.get(&(store_id, message_id)) {
            return Ok(descriptor.clone());
        }

        let object = self
            .identity
            .get_object(store_id, message_id)
            .await
            .map_err(|e| Error::backend(e.to_string()))?;
        let media = object
            .and_then(|object| object.media)
            .ok_or_else(|| Error::object_not_found(store_id, message_id))?;

        let descriptor = FileDescriptor::from(media);
        tracing::debug!(
            identity = self.identity.name(),
            store_id,
            message_id,
            size = descriptor.size,
            dc = %descriptor.dc_id,
            "Resolved file descriptor"
        );
        self.cache.insert((store_id, message_id), descriptor.clone());
        Ok(descriptor)
    }

    /// Drop every cached descriptor.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Spawn a task clearing the cache every `interval`.
    ///
    /// The task exits once the resolver is dropped. Intervals shorter than
    /// one second are raised to one second.
    pub fn start_clear_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_CLEAR_INTERVAL);
        let resolver: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };
                let cleared = resolver.len();
                resolver.clear();
                tracing::debug!(
                    identity = resolver.identity.name(),
                    cleared,
                    "Cleared descriptor cache"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use assert_matches::assert_matches;
    use streamgate_common::DcId;

    fn resolver(backend: &MemoryBackend) -> Arc<FileResolver> {
        let identity = Arc::new(backend.identity("bot1", DcId(2)));
        Arc::new(FileResolver::new(identity))
    }

    #[tokio::test]
    async fn test_resolve_caches() {
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(4), Some("a.mkv"), None, vec![0u8; 16]);
        let resolver = resolver(&backend);

        let first = resolver.resolve(1, 2).await.unwrap();
        let second = resolver.resolve(1, 2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.size, 16);
        assert_eq!(backend.get_object_calls(), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_object_and_media() {
        let backend = MemoryBackend::new();
        backend.insert_text_message(1, 3);
        let resolver = resolver(&backend);

        assert_matches!(
            resolver.resolve(1, 3).await,
            Err(Error::ObjectNotFound {
                store_id: 1,
                message_id: 3
            })
        );
        assert_matches!(
            resolver.resolve(1, 4).await,
            Err(Error::ObjectNotFound { .. })
        );
        assert!(resolver.is_empty());
    }

    #[tokio::test]
    async fn test_cache_keyed_by_store() {
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(4), Some("a"), None, vec![0u8; 1]);
        backend.insert_object(9, 2, DcId(4), Some("b"), None, vec![0u8; 2]);
        let resolver = resolver(&backend);

        assert_eq!(resolver.resolve(1, 2).await.unwrap().size, 1);
        assert_eq!(resolver.resolve(9, 2).await.unwrap().size, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_task_forces_reresolution() {
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(4), Some("a"), None, vec![0u8; 4]);
        let resolver = resolver(&backend);
        let _task = resolver.start_clear_task(Duration::from_secs(1800));

        resolver.resolve(1, 2).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        resolver.resolve(1, 2).await.unwrap();
        assert_eq!(backend.get_object_calls(), 1);

        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert!(resolver.is_empty());
        resolver.resolve(1, 2).await.unwrap();
        assert_eq!(backend.get_object_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_task_exits_with_resolver() {
        let backend = MemoryBackend::new();
        let resolver = resolver(&backend);
        let task = resolver.start_clear_task(Duration::from_secs(10));

        drop(resolver);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(task.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_clear_interval_is_clamped() {
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(4), Some("a"), None, vec![0u8; 4]);
        let resolver = resolver(&backend);
        let task = resolver.start_clear_task(Duration::ZERO);

        resolver.resolve(1, 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!task.is_finished());
        assert!(resolver.is_empty());
        task.abort();
    }
}

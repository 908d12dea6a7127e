//! Storage-backed prefetcher
//!
//! Fetches run on background tasks and land in a shared cache keyed by
//! reference. The output reads from the cache and falls back to storage.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;

use guided_audio_core::{AudioRef, AudioStorage};

use crate::engine::AudioPrefetcher;
use crate::PlayerError;

/// Prefetches audio bytes from an [`AudioStorage`]
#[derive(Clone)]
pub struct StoragePrefetcher {
    storage: Arc<dyn AudioStorage>,
    cache: Arc<DashMap<AudioRef, Arc<Vec<u8>>>>,
    inflight: Arc<DashMap<AudioRef, AbortHandle>>,
}

impl StoragePrefetcher {
    pub fn new(storage: Arc<dyn AudioStorage>) -> Self {
        Self {
            storage,
            cache: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn cached(&self, audio_ref: &AudioRef) -> Option<Arc<Vec<u8>>> {
        self.cache.get(audio_ref).map(|entry| entry.value().clone())
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Bytes for `audio_ref`, from the cache when present
    pub async fn fetch(&self, audio_ref: &AudioRef) -> Result<Arc<Vec<u8>>, PlayerError> {
        if let Some(bytes) = self.cached(audio_ref) {
            return Ok(bytes);
        }
        let bytes = Arc::new(self.storage.get(audio_ref).await?);
        self.cache.insert(audio_ref.clone(), bytes.clone());
        Ok(bytes)
    }
}

impl AudioPrefetcher for StoragePrefetcher {
    fn prefetch(&self, audio_ref: &AudioRef) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(audio_ref = %audio_ref, "No runtime; skipping prefetch");
            return;
        };

        // The slot stays locked until the task is registered, so a ref is fetched once
        let Entry::Vacant(slot) = self.inflight.entry(audio_ref.clone()) else {
            return;
        };
        // A finished fetch fills the cache before leaving `inflight`
        if self.cache.contains_key(audio_ref) {
            return;
        }

        let storage = self.storage.clone();
        let cache = self.cache.clone();
        let inflight = self.inflight.clone();
        let key = audio_ref.clone();

        let task = runtime.spawn(async move {
            match storage.get(&key).await {
                Ok(bytes) => {
                    cache.insert(key.clone(), Arc::new(bytes));
                }
                Err(e) => tracing::warn!(audio_ref = %key, error = %e, "Prefetch failed"),
            }
            inflight.remove(&key);
        });
        slot.insert(task.abort_handle());
    }

    fn cancel_all(&self) {
        let keys: Vec<AudioRef> = self.inflight.iter().map(|entry| entry.key().clone()).collect();
        let tasks: Vec<AbortHandle> = keys
            .iter()
            .filter_map(|key| self.inflight.remove(key).map(|(_, task)| task))
            .collect();
        if !tasks.is_empty() {
            tracing::debug!(count = tasks.len(), "Cancelling prefetches");
        }
        for task in tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use guided_audio_core::{AssetKind, AssetMeta, StorageError};
    use guided_audio_persistence::InMemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Storage whose reads never complete
    struct SlowStorage;

    #[async_trait]
    impl AudioStorage for SlowStorage {
        async fn save(&self, _bytes: Vec<u8>, _meta: AssetMeta) -> Result<AudioRef, StorageError> {
            Ok(AudioRef::new("slow"))
        }

        async fn get(&self, _id: &AudioRef) -> Result<Vec<u8>, StorageError> {
            std::future::pending().await
        }

        async fn meta(&self, id: &AudioRef) -> Result<AssetMeta, StorageError> {
            Err(StorageError::NotFound(id.to_string()))
        }
    }

    /// Counts reads; each takes a little while
    #[derive(Default)]
    struct CountingStorage {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl AudioStorage for CountingStorage {
        async fn save(&self, _bytes: Vec<u8>, _meta: AssetMeta) -> Result<AudioRef, StorageError> {
            Ok(AudioRef::new("counted"))
        }

        async fn get(&self, _id: &AudioRef) -> Result<Vec<u8>, StorageError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![7])
        }

        async fn meta(&self, id: &AudioRef) -> Result<AssetMeta, StorageError> {
            Err(StorageError::NotFound(id.to_string()))
        }
    }

    async fn settle(prefetcher: &StoragePrefetcher) {
        for _ in 0..100 {
            if prefetcher.inflight_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache() {
        let storage = Arc::new(InMemoryStorage::new());
        let id = storage
            .save(vec![1, 2, 3], AssetMeta::wav(AssetKind::Speech, Some(10)))
            .await
            .unwrap();
        let prefetcher = StoragePrefetcher::new(storage);

        prefetcher.prefetch(&id);
        prefetcher.prefetch(&id);
        settle(&prefetcher).await;

        assert_eq!(prefetcher.cached(&id).as_deref(), Some(&vec![1, 2, 3]));
        assert_eq!(prefetcher.cached_count(), 1);
        assert_eq!(*prefetcher.fetch(&id).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_prefetch_reads_once() {
        let storage = Arc::new(CountingStorage::default());
        let prefetcher = StoragePrefetcher::new(storage.clone());
        let id = AudioRef::new("shared");

        let callers: Vec<_> = (0..16)
            .map(|_| {
                let prefetcher = prefetcher.clone();
                let id = id.clone();
                tokio::spawn(async move { prefetcher.prefetch(&id) })
            })
            .collect();
        for caller in callers {
            caller.await.unwrap();
        }
        settle(&prefetcher).await;

        assert_eq!(storage.reads.load(Ordering::SeqCst), 1);
        assert_eq!(prefetcher.cached(&id).as_deref(), Some(&vec![7]));
    }

    #[tokio::test]
    async fn test_missing_ref_is_not_cached() {
        let prefetcher = StoragePrefetcher::new(Arc::new(InMemoryStorage::new()));
        let missing = AudioRef::new("missing");

        prefetcher.prefetch(&missing);
        settle(&prefetcher).await;

        assert!(prefetcher.cached(&missing).is_none());
        assert!(matches!(prefetcher.fetch(&missing).await, Err(PlayerError::Storage(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_inflight() {
        let prefetcher = StoragePrefetcher::new(Arc::new(SlowStorage));
        prefetcher.prefetch(&AudioRef::new("a"));
        prefetcher.prefetch(&AudioRef::new("b"));
        assert_eq!(prefetcher.inflight_count(), 2);

        prefetcher.cancel_all();
        assert_eq!(prefetcher.inflight_count(), 0);
        assert_eq!(prefetcher.cached_count(), 0);
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::domain::ports::{BlobStore, BlobStoreError};

/// In-memory blob store for tests and single-process runs. Failure
/// injection flags let sync tests exercise the absorb-and-report path
/// without a real object store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    put_failure_filter: Mutex<Option<String>>,
    put_count: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Fail only puts whose key contains `needle`; `None` clears the filter.
    pub fn fail_puts_containing(&self, needle: Option<&str>) {
        if let Ok(mut filter) = self.put_failure_filter.lock() {
            *filter = needle.map(str::to_string);
        }
    }

    /// Number of put calls that were accepted, across all keys.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobStoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Backend("injected put failure".into()));
        }
        let filtered = self
            .put_failure_filter
            .lock()
            .map(|filter| filter.as_deref().is_some_and(|needle| key.contains(needle)))
            .unwrap_or(false);
        if filtered {
            return Err(BlobStoreError::Backend("injected put failure".into()));
        }

        let mut objects = self
            .objects
            .write()
            .map_err(|_| BlobStoreError::Backend("lock poisoned".into()))?;
        objects.insert(key.to_string(), data);
        self.put_count.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Backend("injected get failure".into()));
        }

        let objects = self
            .objects
            .read()
            .map_err(|_| BlobStoreError::Backend("lock poisoned".into()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| BlobStoreError::Backend("lock poisoned".into()))?;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| BlobStoreError::Backend("lock poisoned".into()))?;

        Ok(objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("indexes/main/manifest.json", b"{}".to_vec()).await.unwrap();

        let data = store.get("indexes/main/manifest.json").await.unwrap();
        assert_eq!(data, b"{}");
        assert!(store.exists("indexes/main/manifest.json").await.unwrap());
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryBlobStore::new();
        store.put("indexes/main/manifest.json", vec![1]).await.unwrap();
        store.put("indexes/main/segments/seg-a.json", vec![2]).await.unwrap();
        store.put("indexes/other/manifest.json", vec![3]).await.unwrap();

        let keys = store.list("indexes/main/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "indexes/main/manifest.json".to_string(),
                "indexes/main/segments/seg-a.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryBlobStore::new();
        store.fail_puts(true);
        assert!(store.put("k", vec![]).await.is_err());
        assert_eq!(store.put_count(), 0);

        store.fail_puts(false);
        store.put("k", vec![]).await.unwrap();
        store.fail_gets(true);
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_put_failure_filter_targets_matching_keys() {
        let store = MemoryBlobStore::new();
        store.fail_puts_containing(Some("segments/"));

        assert!(store.put("snap/segments/seg-a.json", vec![1]).await.is_err());
        store.put("snap/manifest.json", vec![2]).await.unwrap();

        store.fail_puts_containing(None);
        store.put("snap/segments/seg-a.json", vec![1]).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}

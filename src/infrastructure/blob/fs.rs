use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::domain::ports::{BlobStore, BlobStoreError};

/// Blob store laid out on the local filesystem, one file per key under a
/// root directory. Useful for air-gapped deployments and for exercising
/// the sync layer against real IO.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys map straight onto relative paths, so anything that would
    /// escape the root is rejected before touching the filesystem.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        if key.is_empty() {
            return Err(BlobStoreError::InvalidKey("empty key".into()));
        }

        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobStoreError::Io(e.to_string()))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| BlobStoreError::Io(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobStoreError::Io(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|component| match component {
                        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            keys
        })
        .await
        .map_err(|e| BlobStoreError::Backend(e.to_string()))?;

        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BlobStoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_round_trip_creates_directories() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .put("indexes/main/segments/seg-a.json", b"[]".to_vec())
            .await
            .unwrap();

        let data = store.get("indexes/main/segments/seg-a.json").await.unwrap();
        assert_eq!(data, b"[]");
    }

    #[tokio::test]
    async fn test_list_is_recursive_and_prefix_filtered() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("indexes/main/manifest.json", vec![1]).await.unwrap();
        store.put("indexes/main/segments/seg-a.json", vec![2]).await.unwrap();
        store.put("other/file.bin", vec![3]).await.unwrap();

        let keys = store.list("indexes/main/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "indexes/main/manifest.json".to_string(),
                "indexes/main/segments/seg-a.json".to_string(),
            ]
        );

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_escaping_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for key in ["", "../outside", "a/../../b", "/absolute"] {
            let err = store.put(key, vec![]).await.unwrap_err();
            assert!(matches!(err, BlobStoreError::InvalidKey(_)), "key: {key}");
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.get("indexes/main/manifest.json").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
        assert!(!store.exists("indexes/main/manifest.json").await.unwrap());
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ports::IndexBackend, Embedding, IndexRecord, RetrievalError, ScoredRecord,
};

/// Name of the index descriptor inside the index directory. The sync layer
/// treats its absence as "no local copy exists".
pub const MANIFEST_FILE: &str = "manifest.json";

const SEGMENTS_DIR: &str = "segments";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    dimension: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    segments: Vec<SegmentMeta>,
}

impl Manifest {
    fn new(dimension: usize) -> Self {
        let now = Utc::now();
        Self {
            dimension,
            created_at: now,
            updated_at: now,
            segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentMeta {
    file: String,
    records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Segment {
    records: Vec<IndexRecord>,
}

/// Embedded persistent index backend.
///
/// Records live in memory for querying (exact cosine scan) and on disk as
/// one JSON segment file per upsert batch, described by `manifest.json`.
/// Loading replays segments in manifest order with last-write-wins per id,
/// which is what makes re-adding a chunk_id an overwrite. The directory is
/// the sync snapshot: mirroring it to a blob store and back restores the
/// index without re-embedding anything.
#[derive(Debug)]
pub struct LocalIndex {
    dir: PathBuf,
    dimension: usize,
    records: RwLock<HashMap<String, IndexRecord>>,
    manifest: Mutex<Manifest>,
}

impl LocalIndex {
    /// Opens the index at `dir`, creating an empty one if no manifest is
    /// present. An existing manifest must agree on `dimension`; an index
    /// never changes dimension after creation.
    pub async fn open(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self, RetrievalError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(SEGMENTS_DIR))
            .await
            .map_err(|e| RetrievalError::internal(format!("create index dir: {e}")))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let (manifest, records) = if fs::try_exists(&manifest_path)
            .await
            .map_err(|e| RetrievalError::internal(format!("stat manifest: {e}")))?
        {
            let bytes = fs::read(&manifest_path)
                .await
                .map_err(|e| RetrievalError::internal(format!("read manifest: {e}")))?;
            let manifest: Manifest = serde_json::from_slice(&bytes)
                .map_err(|e| RetrievalError::internal(format!("parse manifest: {e}")))?;

            if manifest.dimension != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: manifest.dimension,
                    actual: dimension,
                });
            }

            let records = Self::load_segments(&dir, &manifest, dimension).await;
            (manifest, records)
        } else {
            let manifest = Manifest::new(dimension);
            write_manifest(&dir, &manifest).await?;
            (manifest, HashMap::new())
        };

        tracing::debug!(
            dir = %dir.display(),
            records = records.len(),
            segments = manifest.segments.len(),
            "local index opened"
        );

        Ok(Self {
            dir,
            dimension,
            records: RwLock::new(records),
            manifest: Mutex::new(manifest),
        })
    }

    /// Replays segment files in manifest order, later segments overriding
    /// earlier ones per record id. A missing or unreadable segment (e.g.
    /// after an interrupted snapshot pull) is skipped with a warning so the
    /// rest of the index stays usable.
    async fn load_segments(
        dir: &Path,
        manifest: &Manifest,
        dimension: usize,
    ) -> HashMap<String, IndexRecord> {
        let mut records = HashMap::new();

        for meta in &manifest.segments {
            let path = dir.join(&meta.file);
            let segment: Segment = match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(segment) => segment,
                    Err(e) => {
                        tracing::warn!(file = %meta.file, error = %e, "skipping corrupt segment");
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!(file = %meta.file, error = %e, "skipping unreadable segment");
                    continue;
                }
            };

            for record in segment.records {
                if record.embedding.dimension() != dimension {
                    tracing::warn!(
                        id = %record.id,
                        dimension = record.embedding.dimension(),
                        "skipping record with wrong dimension"
                    );
                    continue;
                }
                records.insert(record.id.clone(), record);
            }
        }

        records
    }

    fn validate_batch(&self, records: &[IndexRecord]) -> Result<(), RetrievalError> {
        for record in records {
            if record.embedding.dimension() != self.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.embedding.dimension(),
                });
            }
            if !record.embedding.is_finite() {
                return Err(RetrievalError::ingestion(format!(
                    "embedding for '{}' contains non-finite values",
                    record.id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexBackend for LocalIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), RetrievalError> {
        if records.is_empty() {
            return Ok(());
        }
        self.validate_batch(records)?;

        // Segment first, manifest second: a crash in between leaves an
        // orphan file the manifest never references.
        let mut manifest = self.manifest.lock().await;

        let file = format!("{SEGMENTS_DIR}/seg-{}.json", Uuid::new_v4());
        let segment = Segment {
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec(&segment)
            .map_err(|e| RetrievalError::ingestion(format!("encode segment: {e}")))?;
        fs::write(self.dir.join(&file), bytes)
            .await
            .map_err(|e| RetrievalError::ingestion(format!("write segment: {e}")))?;

        manifest.segments.push(SegmentMeta {
            file,
            records: records.len(),
        });
        manifest.updated_at = Utc::now();
        write_manifest(&self.dir, &manifest).await?;

        // The map update stays under the manifest lock so live overwrites
        // land in manifest order; replay after a restart then agrees with
        // what queries were serving. No await separates lock and update.
        let mut map = self
            .records
            .write()
            .map_err(|e| RetrievalError::internal(e.to_string()))?;
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }

        Ok(())
    }

    async fn query(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, RetrievalError> {
        if embedding.dimension() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }

        let map = self
            .records
            .read()
            .map_err(|e| RetrievalError::internal(e.to_string()))?;

        let mut scored: Vec<ScoredRecord> = map
            .values()
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                score: embedding.cosine_similarity(&record.embedding),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        self.records
            .read()
            .map(|map| map.len())
            .map_err(|e| RetrievalError::internal(e.to_string()))
    }
}

async fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), RetrievalError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| RetrievalError::internal(format!("encode manifest: {e}")))?;

    // Write-then-rename keeps a crash from truncating the manifest.
    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| RetrievalError::ingestion(format!("write manifest: {e}")))?;
    fs::rename(&tmp, dir.join(MANIFEST_FILE))
        .await
        .map_err(|e| RetrievalError::ingestion(format!("replace manifest: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkMetadata;
    use std::sync::Arc;

    fn record(id: &str, text: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.into(),
            embedding: Embedding::new(vector),
            text: text.into(),
            metadata: ChunkMetadata::new(id, "test.pdf"),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 3).await.unwrap();

        index
            .upsert(&[record("a", "alpha", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let results = index
            .query(&Embedding::new(vec![1.0, 0.0, 0.0]), 1)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 3).await.unwrap();

        index
            .upsert(&[record("a", "old text", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(&[record("a", "new text", vec![0.0, 1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);

        let results = index
            .query(&Embedding::new(vec![0.0, 1.0, 0.0]), 1)
            .await
            .unwrap();
        assert_eq!(results[0].text, "new text");
    }

    #[tokio::test]
    async fn test_reopen_restores_records() {
        let dir = tempfile::tempdir().unwrap();

        {
            let index = LocalIndex::open(dir.path(), 3).await.unwrap();
            index
                .upsert(&[
                    record("a", "alpha", vec![1.0, 0.0, 0.0]),
                    record("b", "beta", vec![0.0, 1.0, 0.0]),
                ])
                .await
                .unwrap();
            index
                .upsert(&[record("a", "alpha v2", vec![1.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let reopened = LocalIndex::open(dir.path(), 3).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);

        let results = reopened
            .query(&Embedding::new(vec![1.0, 0.0, 0.0]), 1)
            .await
            .unwrap();
        assert_eq!(results[0].text, "alpha v2");
    }

    #[tokio::test]
    async fn test_one_segment_file_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 2).await.unwrap();

        index.upsert(&[record("a", "a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[record("b", "b", vec![0.0, 1.0])]).await.unwrap();

        let segments = std::fs::read_dir(dir.path().join(SEGMENTS_DIR))
            .unwrap()
            .count();
        assert_eq!(segments, 2);
    }

    #[tokio::test]
    async fn test_query_wrong_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 3).await.unwrap();

        let err = index
            .query(&Embedding::new(vec![1.0, 0.0]), 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_rejects_non_finite_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 2).await.unwrap();

        let err = index
            .upsert(&[record("a", "a", vec![f32::NAN, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Ingestion(_)));
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        LocalIndex::open(dir.path(), 3).await.unwrap();

        let err = LocalIndex::open(dir.path(), 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overwrites_keep_memory_and_disk_agreeing() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(LocalIndex::open(dir.path(), 2).await.unwrap());

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    index
                        .upsert(&[record("a", &format!("rev {i}"), vec![1.0, 0.0])])
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        // Whichever revision won in memory must be the one replay serves.
        let live = index
            .query(&Embedding::new(vec![1.0, 0.0]), 1)
            .await
            .unwrap();
        let reopened = LocalIndex::open(dir.path(), 2).await.unwrap();
        let replayed = reopened
            .query(&Embedding::new(vec![1.0, 0.0]), 1)
            .await
            .unwrap();
        assert_eq!(live[0].text, replayed[0].text);
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(dir.path(), 2).await.unwrap();

        index
            .upsert(&[
                record("a", "a", vec![1.0, 0.0]),
                record("b", "b", vec![0.9, 0.1]),
                record("c", "c", vec![0.8, 0.2]),
                record("d", "d", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index
            .query(&Embedding::new(vec![1.0, 0.0]), 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        // Native order is best first.
        assert_eq!(results[0].id, "a");
    }
}

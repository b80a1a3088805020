use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::{
    ports::IndexBackend, ChunkMetadata, Embedding, IndexRecord, RetrievalError, ScoredRecord,
};

/// Managed-remote index backend speaking to a Qdrant collection configured
/// for cosine similarity, so `score` comes back in [0, 1] ready for the
/// coordinator's distance transform. No sync layer applies here; Qdrant is
/// its own durable store.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    pub async fn connect(
        url: &str,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, RetrievalError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RetrievalError::retrieval(e.to_string()))?;

        let index = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };

        index.ensure_collection().await?;

        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| RetrievalError::retrieval(e.to_string()))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RetrievalError::retrieval(e.to_string()))?;
        }

        Ok(())
    }

    /// Qdrant point ids are numeric or UUID; chunk ids are arbitrary
    /// strings. The first 8 bytes of sha256(chunk_id) give a stable u64,
    /// so re-upserting a chunk_id overwrites its point. The true id rides
    /// in the payload.
    fn point_id(chunk_id: &str) -> u64 {
        let digest = Sha256::digest(chunk_id.as_bytes());
        u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ])
    }

    /// Payload is the metadata object with the chunk text folded in under
    /// a `text` key, the same flattened shape the local segment files use.
    fn record_payload(record: &IndexRecord) -> Result<Payload, RetrievalError> {
        let mut object = match serde_json::to_value(&record.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(RetrievalError::internal(
                    "chunk metadata did not serialize to an object",
                ))
            }
            Err(e) => return Err(RetrievalError::internal(e.to_string())),
        };
        object.insert("text".to_string(), Value::String(record.text.clone()));

        Payload::try_from(Value::Object(object))
            .map_err(|e| RetrievalError::internal(format!("build payload: {e}")))
    }

    fn parse_point(point: ScoredPoint) -> Option<ScoredRecord> {
        let mut object: Map<String, Value> = point
            .payload
            .into_iter()
            .map(|(key, value)| (key, payload_value_to_json(value)))
            .collect();

        let text = match object.remove("text") {
            Some(Value::String(text)) => text,
            _ => return None,
        };
        let metadata: ChunkMetadata = serde_json::from_value(Value::Object(object)).ok()?;

        Some(ScoredRecord {
            id: metadata.chunk_id.clone(),
            score: point.score,
            text,
            metadata,
        })
    }
}

#[async_trait]
impl IndexBackend for QdrantIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), RetrievalError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            if record.embedding.dimension() != self.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.embedding.dimension(),
                });
            }
            points.push(PointStruct::new(
                Self::point_id(&record.id),
                record.embedding.as_slice().to_vec(),
                Self::record_payload(record)?,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| RetrievalError::ingestion(e.to_string()))?;

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

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(
                    &self.collection,
                    embedding.as_slice().to_vec(),
                    k as u64,
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| RetrievalError::retrieval(e.to_string()))?;

        let results = response
            .result
            .into_iter()
            .filter_map(|point| {
                let parsed = Self::parse_point(point);
                if parsed.is_none() {
                    tracing::warn!("dropping point with malformed payload");
                }
                parsed
            })
            .collect();

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| RetrievalError::retrieval(e.to_string()))?;

        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or_default() as usize)
    }
}

fn payload_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(payload_value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(key, value)| (key, payload_value_to_json(value)))
                .collect(),
        ),
    }
}

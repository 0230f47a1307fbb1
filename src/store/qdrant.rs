use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{IndexEntry, StoreError, VectorStore};
use crate::document::{Chunk, ScoredChunk};
use crate::external::{VectorDB, VectorDBConfig, VectorHit, VectorRecord};

const CONTENT_KEY: &str = "page_content";
const DOCUMENT_ID_KEY: &str = "document_id";
const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// Chunks stored in a Qdrant collection.
///
/// Ordering of equal scores is whatever the server returns.
pub struct QdrantStore {
    db: VectorDB,
    embedding_model: String,
    reset_pending: Mutex<bool>,
}

impl QdrantStore {
    /// Prepare a fresh collection for `embedding_model`.
    ///
    /// No request is made here. The collection is dropped and recreated on
    /// the first upsert, so a build that fails earlier leaves it intact.
    /// Until then the store reads as empty.
    pub fn create(config: VectorDBConfig, embedding_model: &str) -> Result<Self, StoreError> {
        Ok(Self {
            db: VectorDB::new(config)?,
            embedding_model: embedding_model.to_string(),
            reset_pending: Mutex::new(true),
        })
    }

    /// Reopen a collection filled by a store from [`QdrantStore::create`].
    pub async fn open(config: VectorDBConfig, embedding_model: &str) -> Result<Self, StoreError> {
        let db = VectorDB::new(config)?;
        let name = db.config().collection_name.clone();
        if !db.collection_exists().await? {
            return Err(StoreError::MissingCollection(name));
        }

        if let Some(size) = db.collection_vector_size().await? {
            check_size(db.config().vector_size, size as usize)?;
        }
        check_model(db.first_payload().await?.as_ref(), embedding_model)?;

        info!(collection = %name, "opened Qdrant collection");
        Ok(Self {
            db,
            embedding_model: embedding_model.to_string(),
            reset_pending: Mutex::new(false),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.db.config().collection_name
    }
}

fn check_size(expected: usize, actual: usize) -> Result<(), StoreError> {
    if expected != actual {
        return Err(StoreError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// A collection without points, or with points that predate the model
/// key, is accepted.
fn check_model(
    payload: Option<&HashMap<String, String>>,
    requested: &str,
) -> Result<(), StoreError> {
    match payload.and_then(|p| p.get(EMBEDDING_MODEL_KEY)) {
        Some(stored) if stored != requested => Err(StoreError::ModelMismatch {
            stored: stored.clone(),
            requested: requested.to_string(),
        }),
        _ => Ok(()),
    }
}

fn to_record(entry: IndexEntry, embedding_model: &str) -> VectorRecord {
    let mut payload = entry.chunk.metadata;
    payload.insert(CONTENT_KEY.to_string(), entry.chunk.content);
    payload.insert(
        DOCUMENT_ID_KEY.to_string(),
        entry.chunk.source_document_id.to_string(),
    );
    payload.insert(EMBEDDING_MODEL_KEY.to_string(), embedding_model.to_string());

    VectorRecord {
        id: entry.id.to_string(),
        vector: entry.vector,
        payload,
    }
}

fn from_hit(hit: VectorHit) -> ScoredChunk {
    let mut metadata: HashMap<String, String> = hit.payload;
    let content = metadata.remove(CONTENT_KEY).unwrap_or_default();
    let source_document_id = metadata
        .remove(DOCUMENT_ID_KEY)
        .and_then(|id| Uuid::parse_str(&id).ok())
        .unwrap_or_else(Uuid::nil);
    metadata.remove(EMBEDDING_MODEL_KEY);

    ScoredChunk {
        chunk: Chunk {
            content,
            metadata,
            source_document_id,
        },
        score: hit.score,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        let expected = self.db.config().vector_size;
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        let mut reset_pending = self.reset_pending.lock().await;
        if *reset_pending {
            self.db.recreate_collection().await?;
            *reset_pending = false;
        }

        let records = entries
            .into_iter()
            .map(|entry| to_record(entry, &self.embedding_model))
            .collect();
        self.db.insert_vectors(records).await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 || *self.reset_pending.lock().await {
            return Ok(Vec::new());
        }

        let hits = self
            .db
            .search_vectors(query.to_vec(), k as u64, score_threshold)
            .await?;

        // Threshold is enforced server-side too.
        Ok(hits
            .into_iter()
            .map(from_hit)
            .filter(|hit| hit.score >= score_threshold)
            .take(k)
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        if *self.reset_pending.lock().await {
            return Ok(0);
        }
        Ok(self.db.count_points().await? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn test_record_round_trips_chunk_fields() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "saleor/payment/gateway.py".to_string());
        let doc = Document::new("def capture(): ...".to_string(), metadata);
        let entry = IndexEntry {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            chunk: Chunk::from_document(&doc, "def capture(): ...".to_string(), 0),
        };
        let expected = entry.chunk.clone();

        let record = to_record(entry, "nomic-embed-text");
        assert_eq!(record.payload[CONTENT_KEY], "def capture(): ...");
        assert_eq!(record.payload[EMBEDDING_MODEL_KEY], "nomic-embed-text");

        let hit = VectorHit {
            id: record.id,
            score: 0.8,
            payload: record.payload,
        };
        let scored = from_hit(hit);

        assert_eq!(scored.chunk, expected);
        assert_eq!(scored.score, 0.8);
    }

    #[test]
    fn test_hit_without_document_id_gets_nil() {
        let hit = VectorHit {
            id: "x".to_string(),
            score: 0.5,
            payload: HashMap::new(),
        };
        let scored = from_hit(hit);
        assert!(scored.chunk.content.is_empty());
        assert!(scored.chunk.source_document_id.is_nil());
    }

    #[tokio::test]
    async fn test_created_store_reads_empty_before_first_upsert() {
        // Nothing listens on this port; no request may be made.
        let config = VectorDBConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..VectorDBConfig::default()
        };
        let store = QdrantStore::create(config, "nomic-embed-text").unwrap();

        assert_eq!(store.collection_name(), "repo_chunks");
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store
            .similarity_search(&[0.1; 768], 5, 0.0)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_model_check_on_open() {
        let mut payload = HashMap::new();
        assert!(check_model(None, "nomic-embed-text").is_ok());
        assert!(check_model(Some(&payload), "nomic-embed-text").is_ok());

        payload.insert(EMBEDDING_MODEL_KEY.to_string(), "nomic-embed-text".to_string());
        assert!(check_model(Some(&payload), "nomic-embed-text").is_ok());
        assert!(matches!(
            check_model(Some(&payload), "mxbai-embed-large"),
            Err(StoreError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_size_check_on_open() {
        assert!(check_size(768, 768).is_ok());
        assert!(matches!(
            check_size(768, 1024),
            Err(StoreError::DimensionMismatch {
                expected: 768,
                actual: 1024
            })
        ));
    }
}

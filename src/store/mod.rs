//! Vector storage for embedded chunks.
//!
//! [`LocalVectorStore`] persists the index as JSON under a directory and
//! searches it by brute-force cosine similarity. [`QdrantStore`] delegates to a
//! Qdrant collection. Both return hits ordered by descending score, truncated
//! to `k` and filtered by a minimum score.

mod local;
mod qdrant;

pub use local::LocalVectorStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::document::{Chunk, ScoredChunk};
use crate::external::{Embedder, ExternalError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No chunks to ingest")]
    Empty,

    #[error("Index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index was built with embedding model {stored}, but {requested} was requested")]
    ModelMismatch { stored: String, requested: String },

    #[error("Collection {0} does not exist")]
    MissingCollection(String),

    #[error("Vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Backend(#[from] ExternalError),
}

/// One stored vector together with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist entries. Entries with an existing id are replaced.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError>;

    /// Return at most `k` chunks scoring at least `score_threshold`
    /// against `query`, highest score first.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// Embed every chunk with `embedder` and write the vectors into `store`.
pub async fn ingest(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> Result<usize, StoreError> {
    if chunks.is_empty() {
        return Err(StoreError::Empty);
    }

    let entries: Vec<IndexEntry> = stream::iter(chunks)
        .then(|chunk| async move {
            let vector = embedder.embed(&chunk.content).await?;
            Ok::<_, StoreError>(IndexEntry {
                id: Uuid::new_v4(),
                vector,
                chunk,
            })
        })
        .try_collect()
        .await?;

    let count = entries.len();
    store.upsert(entries).await?;
    info!("Embedded {} chunks with {}", count, embedder.model_name());
    Ok(count)
}

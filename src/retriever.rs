use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::document::ScoredChunk;
use crate::external::{Embedder, ExternalError};
use crate::store::{StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] ExternalError),

    #[error("Similarity search failed: {0}")]
    Search(#[from] StoreError),
}

/// Fixed query parameters of a [`Retriever`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Maximum number of chunks returned.
    pub k: usize,
    /// Minimum cosine similarity for a chunk to be returned.
    pub score_threshold: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            k: 5,
            score_threshold: 0.3,
        }
    }
}

/// Answers queries against a store using the embedder the store was built with.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Configure a retriever over `store`. Performs no I/O.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> RetrieverConfig {
        self.config
    }

    /// Up to `k` chunks scoring at least the threshold, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .store
            .similarity_search(&vector, self.config.k, self.config.score_threshold)
            .await?;
        debug!(
            "Retrieved {} chunks (k={}, threshold={})",
            hits.len(),
            self.config.k,
            self.config.score_threshold
        );
        Ok(hits)
    }
}

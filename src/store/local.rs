use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{IndexEntry, StoreError, VectorStore};
use crate::chunker::cosine_similarity;
use crate::document::ScoredChunk;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct IndexFile {
    embedding_model: String,
    dimensions: Option<usize>,
    entries: Vec<IndexEntry>,
    #[serde(skip)]
    positions: HashMap<Uuid, usize>,
}

impl IndexFile {
    fn reindex(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();
    }

    /// Dimensions the index will have after accepting `entries`.
    fn check_dimensions(&self, entries: &[IndexEntry]) -> Result<Option<usize>, StoreError> {
        let mut dimensions = self.dimensions;
        for entry in entries {
            let expected = *dimensions.get_or_insert(entry.vector.len());
            if entry.vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }
        }
        Ok(dimensions)
    }

    fn apply(&mut self, entries: Vec<IndexEntry>) {
        for entry in entries {
            match self.positions.get(&entry.id) {
                Some(&i) => self.entries[i] = entry,
                None => {
                    self.positions.insert(entry.id, self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }
}

/// A vector index kept in memory and mirrored to `<persist_dir>/index.json`.
///
/// Search is exhaustive cosine similarity. Sorting is stable, so entries
/// with equal scores come back in ingestion order.
#[derive(Debug)]
pub struct LocalVectorStore {
    path: PathBuf,
    index: RwLock<IndexFile>,
}

impl LocalVectorStore {
    /// Start a fresh, empty index for `embedding_model`.
    ///
    /// Nothing is written here. The first successful upsert replaces any
    /// index already in `persist_dir`, so a build that fails before
    /// ingestion leaves the previous index intact.
    pub fn create<P: AsRef<Path>>(persist_dir: P, embedding_model: &str) -> Self {
        Self {
            path: persist_dir.as_ref().join(INDEX_FILE),
            index: RwLock::new(IndexFile {
                embedding_model: embedding_model.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Reopen an index persisted by [`LocalVectorStore::create`].
    pub async fn open<P: AsRef<Path>>(
        persist_dir: P,
        embedding_model: &str,
    ) -> Result<Self, StoreError> {
        let path = persist_dir.as_ref().join(INDEX_FILE);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        let mut index: IndexFile = serde_json::from_slice(&raw)?;

        if index.embedding_model != embedding_model {
            return Err(StoreError::ModelMismatch {
                stored: index.embedding_model,
                requested: embedding_model.to_string(),
            });
        }
        index.reindex();

        info!("Opened index {:?} with {} entries", path, index.entries.len());
        Ok(Self {
            path,
            index: RwLock::new(index),
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, index: &IndexFile) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(index)?;
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!("Wrote {} entries to {:?}", index.entries.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        let mut index = self.index.write().await;
        let dimensions = index.check_dimensions(&entries)?;

        // Memory only changes once the file is written.
        let mut staged = index.clone();
        staged.dimensions = dimensions;
        staged.apply(entries);
        self.flush(&staged).await?;

        *index = staged;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let index = self.index.read().await;

        if let Some(expected) = index.dimensions {
            if query.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<ScoredChunk> = index
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.vector, query) as f32,
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.index.read().await.entries.len())
    }
}

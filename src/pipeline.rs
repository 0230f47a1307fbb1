//! End-to-end assembly: load, filter, chunk, embed, store, retrieve, prompt, generate.
//!
//! Construction is all-or-nothing: each stage logs and returns its error, and
//! two gates refuse to continue with zero documents or zero chunks. Answering
//! comes in two flavours, [`RagPipeline::answer`] which reports failures and
//! [`RagPipeline::answer_best_effort`] which logs them and yields `None`.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::chunker::{BreakpointThreshold, Chunker, ChunkingError, SemanticChunker};
use crate::document::filter_nonempty;
use crate::external::{Embedder, ExternalError, LanguageModel};
use crate::loader::DirectoryLoader;
use crate::prompt::PromptTemplate;
use crate::retriever::{RetrievalError, Retriever, RetrieverConfig};
use crate::store::{ingest, StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No valid documents loaded from {root} (extensions: {extensions})")]
    NoDocuments { root: String, extensions: String },

    #[error("No valid chunks to embed")]
    NoChunks,

    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Failed to build vector store: {0}")]
    Ingest(#[source] StoreError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Generation failed: {0}")]
    Generation(#[source] ExternalError),
}

/// Tunables that shape a pipeline but are not collaborators.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub breakpoint: BreakpointThreshold,
    pub retriever: RetrieverConfig,
    pub prompt: PromptTemplate,
}

pub struct RagPipeline {
    retriever: Retriever,
    prompt: PromptTemplate,
    llm: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("retriever", &self.retriever.config())
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Load documents with `loader`, chunk them semantically, embed them into
    /// `store`, and wire up retrieval and generation. `llm` is not contacted here.
    pub async fn build(
        loader: &DirectoryLoader,
        settings: PipelineSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self, PipelineError> {
        let chunker = SemanticChunker::new(embedder.clone(), settings.breakpoint);
        Self::build_with_chunker(loader, &chunker, settings, embedder, store, llm).await
    }

    /// [`build`](Self::build) with a caller-supplied chunking strategy.
    pub async fn build_with_chunker(
        loader: &DirectoryLoader,
        chunker: &dyn Chunker,
        settings: PipelineSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self, PipelineError> {
        let documents = filter_nonempty(loader.load());
        info!("Filtered to {} valid documents", documents.len());

        if documents.is_empty() {
            warn!(
                "No documents loaded. Check if {:?} contains {} files.",
                loader.root(),
                loader.extensions().join(", ")
            );
            return Err(PipelineError::NoDocuments {
                root: loader.root().display().to_string(),
                extensions: loader.extensions().join(","),
            });
        }

        let chunks = chunker.split_documents(&documents).await.map_err(|e| {
            error!("Error during chunking: {}", e);
            PipelineError::from(e)
        })?;
        info!("Created {} chunks", chunks.len());

        let chunks = filter_nonempty(chunks);
        info!("Filtered to {} valid chunks", chunks.len());
        if chunks.is_empty() {
            error!("Error during chunking: no valid chunks to embed");
            return Err(PipelineError::NoChunks);
        }

        ingest(chunks, embedder.as_ref(), store.as_ref())
            .await
            .map_err(|e| {
                error!("Error creating vector store: {}", e);
                PipelineError::Ingest(e)
            })?;
        info!("Embedded chunks and stored in vector database");

        Ok(Self::open(settings, embedder, store, llm))
    }

    /// Wire a pipeline over a store that already holds embedded chunks.
    pub fn open(
        settings: PipelineSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let retriever = Retriever::new(store, embedder, settings.retriever);
        info!(
            "Configured retriever (k={}, score_threshold={})",
            settings.retriever.k, settings.retriever.score_threshold
        );

        Self {
            retriever,
            prompt: settings.prompt,
            llm,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Retrieve context for `question`, render the prompt and generate an answer.
    pub async fn answer(&self, question: &str) -> Result<String, PipelineError> {
        let context = self.retriever.retrieve(question).await?;
        info!("Retrieved {} context chunks", context.len());

        let prompt = self.prompt.render(&context, question);
        self.llm
            .generate(&prompt)
            .await
            .map_err(PipelineError::Generation)
    }

    /// Like [`answer`](Self::answer), but failures are logged and swallowed.
    pub async fn answer_best_effort(&self, question: &str) -> Option<String> {
        match self.answer(question).await {
            Ok(response) => {
                info!("Query response: {}", response);
                Some(response)
            }
            Err(e) => {
                error!("Error running RAG pipeline: {}", e);
                None
            }
        }
    }
}

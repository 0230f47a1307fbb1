pub mod chunker;
pub mod config;
pub mod document;
pub mod external;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod store;

pub use chunker::{BreakpointThreshold, Chunker, ChunkingError, SemanticChunker};
pub use config::{Config, StoreBackend};
pub use document::{filter_nonempty, Chunk, Document, HasContent, ScoredChunk};
pub use external::{Embedder, EmbeddingEngine, ExternalError, LLMEngine, LanguageModel};
pub use loader::{DirectoryLoader, LoaderError};
pub use pipeline::{PipelineError, PipelineSettings, RagPipeline};
pub use prompt::{PromptTemplate, FALLBACK_ANSWER};
pub use retriever::{RetrievalError, Retriever, RetrieverConfig};
pub use store::{ingest, IndexEntry, LocalVectorStore, QdrantStore, StoreError, VectorStore};

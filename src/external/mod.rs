mod embedding;
pub mod error;
mod llm;
pub mod vectordb;

pub use embedding::{Embedder, EmbeddingConfig, EmbeddingEngine};
pub use error::ExternalError;
pub use llm::{LLMConfig, LLMEngine, LanguageModel};
pub use vectordb::{VectorDB, VectorDBConfig, VectorHit, VectorRecord};

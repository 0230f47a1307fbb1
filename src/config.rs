use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::chunker::BreakpointThreshold;
use crate::external::{EmbeddingConfig, LLMConfig, VectorDBConfig};
use crate::loader::default_excluded_dirs;
use crate::retriever::RetrieverConfig;

/// Where chunk vectors are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON index under the persist directory.
    Local,
    /// Qdrant collection.
    Qdrant,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local),
            "qdrant" => Ok(StoreBackend::Qdrant),
            other => Err(anyhow::anyhow!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub root: String,
    pub extensions: Vec<String>,
    pub excluded_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub persist_dir: String,
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub llm: LLMConfig,
    pub vector_db: VectorDBConfig,
    pub loader: LoaderConfig,
    pub breakpoint: BreakpointThreshold,
    pub retriever: RetrieverConfig,
    pub output: OutputConfig,
    pub log_level: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let ollama_host = var_or("OLLAMA_HOST", "localhost");
        let ollama_port = parse_or("OLLAMA_PORT", 11434);

        // Load embedding config
        let embedding = EmbeddingConfig {
            model: var_or("OLLAMA_EMBEDDING_MODEL", "nomic-embed-text"),
            host: ollama_host.clone(),
            port: ollama_port,
        };

        // Load LLM config
        let llm_defaults = LLMConfig::default();
        let llm = LLMConfig {
            model: var_or("OLLAMA_LLM_MODEL", &llm_defaults.model),
            host: ollama_host,
            port: ollama_port,
            temperature: parse_or("OLLAMA_TEMPERATURE", llm_defaults.temperature),
            top_p: parse_or("OLLAMA_TOP_P", llm_defaults.top_p),
            num_predict: parse_or("OLLAMA_NUM_PREDICT", llm_defaults.num_predict),
        };

        // Load vector DB config
        let db_defaults = VectorDBConfig::default();
        let vector_db = VectorDBConfig {
            collection_name: var_or("QDRANT_COLLECTION", &db_defaults.collection_name),
            host: var_or("QDRANT_HOST", &db_defaults.host),
            port: parse_or("QDRANT_PORT", db_defaults.port),
            vector_size: parse_or("QDRANT_VECTOR_SIZE", db_defaults.vector_size),
        };

        let loader = LoaderConfig {
            root: var_or("RAG_ROOT", "."),
            extensions: list(&var_or("RAG_EXTENSIONS", "py,md,txt")),
            excluded_dirs: env::var("RAG_EXCLUDED_DIRS")
                .map(|v| list(&v))
                .unwrap_or_else(|_| default_excluded_dirs()),
        };

        let breakpoint_type = var_or("RAG_BREAKPOINT_TYPE", "percentile");
        let breakpoint_amount = env::var("RAG_BREAKPOINT_AMOUNT")
            .ok()
            .and_then(|v| v.trim().parse().ok());
        let breakpoint = BreakpointThreshold::from_name(&breakpoint_type, breakpoint_amount)
            .ok_or_else(|| anyhow::anyhow!("unknown breakpoint type: {}", breakpoint_type))?;

        let retriever_defaults = RetrieverConfig::default();
        let retriever = RetrieverConfig {
            k: parse_or("RAG_TOP_K", retriever_defaults.k),
            score_threshold: parse_or("RAG_SCORE_THRESHOLD", retriever_defaults.score_threshold),
        };

        let output = OutputConfig {
            persist_dir: var_or("RAG_PERSIST_DIR", "./vector_index"),
            backend: var_or("RAG_BACKEND", "local").parse()?,
        };

        Ok(Self {
            embedding,
            llm,
            vector_db,
            loader,
            breakpoint,
            retriever,
            output,
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}

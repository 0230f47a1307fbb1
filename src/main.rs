use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use repo_rag::{
    Config, DirectoryLoader, Embedder, EmbeddingEngine, LLMEngine, LanguageModel,
    LocalVectorStore, PipelineSettings, PromptTemplate, QdrantStore, RagPipeline, StoreBackend,
    VectorStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Answer questions about a code repository with a local LLM", long_about = None)]
struct Args {
    /// Question to answer
    question: String,

    /// Repository root to index
    #[arg(short = 'r', long)]
    root: Option<String>,

    /// Directory for the persisted vector index
    #[arg(short = 'd', long)]
    persist_dir: Option<String>,

    /// Comma-separated file extensions to load
    #[arg(short = 'x', long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum similarity score of a retrieved chunk
    #[arg(short = 's', long)]
    score_threshold: Option<f32>,

    /// Ollama host, with or without scheme
    #[arg(long)]
    ollama_host: Option<String>,

    /// Ollama port
    #[arg(long)]
    ollama_port: Option<u16>,

    /// Model used for generation
    #[arg(short = 'm', long)]
    llm_model: Option<String>,

    /// Model used for chunking, indexing and queries
    #[arg(short = 'e', long)]
    embedding_model: Option<String>,

    /// Vector store backend
    #[arg(short = 'b', long, value_enum)]
    backend: Option<StoreBackend>,

    /// Answer from an existing index instead of rebuilding it
    #[arg(long)]
    reuse_index: bool,
}

impl Args {
    /// CLI flags take precedence over environment configuration.
    fn apply(self, config: &mut Config) -> String {
        if let Some(root) = self.root {
            config.loader.root = root;
        }
        if let Some(dir) = self.persist_dir {
            config.output.persist_dir = dir;
        }
        if let Some(extensions) = self.extensions {
            config.loader.extensions = extensions;
        }
        if let Some(k) = self.top_k {
            config.retriever.k = k;
        }
        if let Some(threshold) = self.score_threshold {
            config.retriever.score_threshold = threshold;
        }
        if let Some(host) = self.ollama_host {
            config.embedding.host = host.clone();
            config.llm.host = host;
        }
        if let Some(port) = self.ollama_port {
            config.embedding.port = port;
            config.llm.port = port;
        }
        if let Some(model) = self.llm_model {
            config.llm.model = model;
        }
        if let Some(model) = self.embedding_model {
            config.embedding.model = model;
        }
        if let Some(backend) = self.backend {
            config.output.backend = backend;
        }
        self.question
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn open_store(
    config: &Config,
    embedder: &dyn Embedder,
    reuse: bool,
) -> Result<Arc<dyn VectorStore>> {
    let model = embedder.model_name();
    let store: Arc<dyn VectorStore> = match (config.output.backend, reuse) {
        (StoreBackend::Local, true) => {
            Arc::new(LocalVectorStore::open(&config.output.persist_dir, model).await?)
        }
        // Nothing is replaced until chunks are ingested.
        (StoreBackend::Local, false) => {
            Arc::new(LocalVectorStore::create(&config.output.persist_dir, model))
        }
        (StoreBackend::Qdrant, true) => {
            Arc::new(QdrantStore::open(config.vector_db.clone(), model).await?)
        }
        (StoreBackend::Qdrant, false) => {
            Arc::new(QdrantStore::create(config.vector_db.clone(), model)?)
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let reuse_index = args.reuse_index;

    let mut config = Config::from_env()?;
    let question = args.apply(&mut config);
    init_logging(&config.log_level);

    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingEngine::new(config.embedding.clone())?);
    let llm: Arc<dyn LanguageModel> = Arc::new(LLMEngine::new(config.llm.clone())?);
    info!("Connected to Ollama LLM {}", config.llm.model);

    let settings = PipelineSettings {
        breakpoint: config.breakpoint,
        retriever: config.retriever,
        prompt: PromptTemplate::default(),
    };

    let store = open_store(&config, embedder.as_ref(), reuse_index)
        .await
        .context("failed to open vector store")?;

    let pipeline = if reuse_index {
        RagPipeline::open(settings, embedder, store, llm)
    } else {
        let loader = DirectoryLoader::new(&config.loader.root, config.loader.extensions.clone())
            .with_excluded_dirs(config.loader.excluded_dirs.clone());
        RagPipeline::build(&loader, settings, embedder, store, llm).await?
    };
    info!("Assembled RAG pipeline");

    if let Some(answer) = pipeline.answer_best_effort(&question).await {
        println!("{}", answer);
    }

    Ok(())
}

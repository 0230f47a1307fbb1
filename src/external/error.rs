use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Any failure talking to the inference server: refused connection,
    /// timeout or a response that could not be decoded.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Vector DB error: {0}")]
    VectorDBError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Build an `http(s)://host:port` base URL, accepting hosts with or without a scheme.
pub(crate) fn service_url(host: &str, port: u16) -> Result<url::Url, ExternalError> {
    let url = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    };

    url::Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))
}

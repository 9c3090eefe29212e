use thiserror::Error;

use crate::embeddings::provider::Provider;

/// Failure of a single embedding request. Never retried here; the caller
/// decides whether one failure aborts the surrounding work.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Cannot create an embedding for empty text")]
    EmptyInput,

    #[error("API key is missing for provider {0} (set {env})", env = .0.env_var_name())]
    MissingApiKey(Provider),

    #[error("Embedding API returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum SnapragError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    #[error("Knowledge entry {0} not found")]
    EntryNotFound(u64),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SnapragError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding model mismatch: index built with '{index}', query embedded with '{query}'")]
    EmbeddingMismatch { index: String, query: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MatchError>;

use thiserror::Error;

/// Errors surfaced by the retrieval index.
///
/// Extraction problems are deliberately absent from most call paths: a file that
/// cannot be read yields empty text and is skipped. `Extraction` exists for the
/// individual extractors, whose failures the registry converts into empty text.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The embedding model could not be loaded or failed to encode text.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(err.to_string())
    }
}

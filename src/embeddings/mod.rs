pub mod hashing;
pub mod local;
pub mod tei;
pub mod r#trait;

#[cfg(feature = "fastembed")]
pub mod fastembed;

pub use hashing::HashingEmbedder;
pub use local::LocalEmbeddingProvider;
pub use r#trait::{normalize, EmbeddingProvider, DEFAULT_BATCH_SIZE};
pub use tei::TeiEmbeddingProvider;

#[cfg(feature = "fastembed")]
pub use self::fastembed::FastEmbedProvider;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use std::sync::Arc;

/// Build the configured embedding provider
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(
            LocalEmbeddingProvider::new(Some(&config.url), Some(&config.model), Some(config.dims))
                .with_batch_size(config.batch_size),
        )),
        "tei" => Ok(Arc::new(TeiEmbeddingProvider::new(
            Some(&config.url),
            Some(config.dims),
        ))),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        #[cfg(feature = "fastembed")]
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(None))),
        #[cfg(not(feature = "fastembed"))]
        "fastembed" => Err(RagError::Embedding(
            "fastembed support is not enabled. Compile with --features fastembed".to_string(),
        )),
        other => Err(RagError::Config(format!("unknown embedding provider: {other}"))),
    }
}

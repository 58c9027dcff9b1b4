//! In-process sentence embeddings with fastembed (ONNX Runtime).

use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use ::fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// all-MiniLM-L6-v2, loaded on first use and kept for the process lifetime
pub struct FastEmbedProvider {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    cache_dir: Option<PathBuf>,
    batch_size: usize,
}

impl FastEmbedProvider {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            cache_dir,
            batch_size: crate::embeddings::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.model.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    fn encode_blocking(
        model: &Mutex<Option<TextEmbedding>>,
        cache_dir: Option<PathBuf>,
        texts: Vec<String>,
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let mut guard = model
            .lock()
            .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;

        if guard.is_none() {
            info!("Loading embedding model all-MiniLM-L6-v2");
            let mut options = TextInitOptions::new(EmbeddingModel::AllMiniLML6V2);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            let loaded = TextEmbedding::try_new(options).map_err(RagError::embedding)?;
            *guard = Some(loaded);
        }

        let model = guard
            .as_mut()
            .ok_or_else(|| RagError::Embedding("Model not initialized".to_string()))?;
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        model
            .embed(refs, Some(batch_size))
            .map_err(RagError::embedding)
    }
}

impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let cache_dir = self.cache_dir.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || Self::encode_blocking(&model, cache_dir, texts, batch_size))
            .await
            .map_err(RagError::embedding)?
    }

    fn dimension(&self) -> usize {
        384
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

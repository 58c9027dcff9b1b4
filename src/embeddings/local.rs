use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Local embedding provider using the Ollama batch embedding API
pub struct LocalEmbeddingProvider {
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    client: reqwest::Client,
}

impl LocalEmbeddingProvider {
    /// Determine embedding dimension from model name
    pub(crate) fn get_dimension_for_model(model: &str) -> usize {
        match model {
            m if m.contains("all-minilm") => 384,
            m if m.contains("mxbai-embed") => 1024,
            m if m.contains("nomic-embed") => 768,
            _ => 384,
        }
    }

    /// Create a new local embedding provider using Ollama.
    /// Uses provided dimension, or derives it from the model name.
    pub fn new(base_url: Option<&str>, model: Option<&str>, dimension: Option<usize>) -> Self {
        let model_name = model.unwrap_or("all-minilm").to_string();
        let dimension = dimension.unwrap_or_else(|| Self::get_dimension_for_model(&model_name));

        Self {
            base_url: base_url.unwrap_or("http://127.0.0.1:11434").to_string(),
            model: model_name,
            dimension,
            batch_size: crate::embeddings::DEFAULT_BATCH_SIZE,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama API returned error: {}", response.status());
        }

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .context("Failed to parse Ollama embedding response")?;

        Ok(body.embeddings)
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts)
            .await
            .map_err(|e| RagError::Embedding(format!("{e:#}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

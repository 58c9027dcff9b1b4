use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use anyhow::Context;
use serde::Serialize;

/// Text Embeddings Inference (TEI) provider from Hugging Face
pub struct TeiEmbeddingProvider {
    base_url: String,
    dimension: usize,
    client: reqwest::Client,
}

impl TeiEmbeddingProvider {
    /// Create a new TEI embedding provider
    /// Default URL: http://127.0.0.1:8080
    pub fn new(base_url: Option<&str>, dimension: Option<usize>) -> Self {
        Self {
            base_url: base_url.unwrap_or("http://127.0.0.1:8080").to_string(),
            dimension: dimension.unwrap_or(384),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);

        let request = TeiEmbeddingRequest {
            inputs: texts,
            truncate: Some(true),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to TEI server")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("TEI API returned error {}: {}", status, error_text);
        }

        // TEI returns one embedding per input
        response
            .json::<Vec<Vec<f32>>>()
            .await
            .context("Failed to parse TEI embedding response")
    }
}

#[derive(Serialize)]
struct TeiEmbeddingRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for TeiEmbeddingProvider {
    async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts)
            .await
            .map_err(|e| RagError::Embedding(format!("{e:#}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    // TEI's default max client batch size
    fn batch_size(&self) -> usize {
        32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tei_embedding_provider_creation() {
        let provider = TeiEmbeddingProvider::new(None, None);
        assert_eq!(provider.base_url, "http://127.0.0.1:8080");
        assert_eq!(provider.dimension(), 384);
    }

    #[test]
    fn test_tei_request_shape() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_value(TeiEmbeddingRequest {
            inputs: &texts,
            truncate: Some(true),
        })
        .unwrap();
        assert_eq!(body["inputs"], serde_json::json!(["a", "b"]));
        assert_eq!(body["truncate"], serde_json::json!(true));
    }

    #[tokio::test]
    #[ignore] // Requires TEI server running
    async fn test_tei_embedding_provider_compute() {
        let provider = TeiEmbeddingProvider::new(None, Some(384));
        let embedding = provider.embed_one("test content").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}

use crate::error::{RagError, Result};

/// Default number of texts sent to the model per encode call
pub const DEFAULT_BATCH_SIZE: usize = 64;

const NORM_EPSILON: f32 = 1e-12;

/// Divide each component by the L2 norm plus a small epsilon, so inner product
/// between two normalized vectors is their cosine similarity
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Trait for embedding providers that turn text into fixed-dimension vectors
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode one batch of texts into raw (not necessarily normalized) vectors
    async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider
    fn dimension(&self) -> usize;

    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Encode texts in batches and L2-normalize every row.
    ///
    /// Fails if the model returns the wrong number of rows or a row of the
    /// wrong dimension.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size().max(1)) {
            let batch_vectors = self.compute_embeddings(batch).await?;
            if batch_vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "model returned {} vectors for {} texts",
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        let expected = self.dimension();
        for vector in vectors.iter_mut() {
            if vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            normalize(vector);
        }
        Ok(vectors)
    }

    /// Encode a single text (queries)
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("no embedding returned".to_string()))
    }
}

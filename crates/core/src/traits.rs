use crate::error::EmbeddingServiceError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Pinned model identifier recorded alongside every index built with it.
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, inputs: &[String])
        -> Result<Vec<Vec<f32>>, EmbeddingServiceError>;

    async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingServiceError::Malformed(format!(
                "expected 1 vector for a single input, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

#[async_trait]
impl<E> Embedder for Arc<E>
where
    E: Embedder + ?Sized,
{
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        (**self).embed_batch(inputs).await
    }
}

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::EmbeddingServiceError;
use crate::traits::Embedder;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

const HASHING_MODEL: &str = "hashing-ngram-v1";

const STOPWORDS: [&str; 24] = [
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of",
    "on", "or", "shall", "such", "that", "the", "to", "which", "with",
];

/// Deterministic offline embedder: hashed word unigrams plus in-word
/// character trigrams, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("{HASHING_MODEL}:{dimensions}"),
        }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty() && !STOPWORDS.contains(word))
        {
            vector[bucket(word, b'w', self.dimensions)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let gram = window.iter().collect::<String>();
                vector[bucket(&gram, b'g', self.dimensions)] += 0.5;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn bucket(token: &str, salt: u8, buckets: usize) -> usize {
    let mut hash = 1469598103934665603u64;
    for byte in std::iter::once(salt).chain(token.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        Ok(inputs.iter().map(|input| self.vectorize(input)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimensions: usize,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingServiceError> {
        if model.trim().is_empty() {
            return Err(EmbeddingServiceError::Config(
                "missing embedding model name".to_string(),
            ));
        }

        let endpoint = Url::parse(&format!("{}/embeddings", base_url.trim_end_matches('/')))
            .map_err(|error| {
                EmbeddingServiceError::Config(format!("invalid endpoint {base_url}: {error}"))
            })?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model: model.trim().to_string(),
            dimensions,
            api_key,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingServiceError::Response {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingServiceError::Malformed(error.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingServiceError::Malformed(format!(
                "endpoint returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        if let Some(entry) = parsed
            .data
            .iter()
            .find(|entry| entry.embedding.len() != self.dimensions)
        {
            return Err(EmbeddingServiceError::Malformed(format!(
                "embedding dimension {} != configured {}",
                entry.embedding.len(),
                self.dimensions
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "attempt_timeout_ms")]
    pub attempt_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "backoff_base_ms")]
    pub backoff_base: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "backoff_max_ms")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// Applies a per-attempt timeout and bounded backoff to transient failures.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome =
                match tokio::time::timeout(self.policy.attempt_timeout, self.inner.embed_batch(inputs))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(EmbeddingServiceError::Timeout(self.policy.attempt_timeout)),
                };

            let error = match outcome {
                Ok(vectors) => return Ok(vectors),
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(error);
            }
            if attempt >= max_attempts {
                return Err(EmbeddingServiceError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "embedding call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Embeds `texts` in batches, at most `concurrency` batches in flight,
/// keeping the output in input order.
pub async fn embed_all<E>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingServiceError>
where
    E: Embedder + ?Sized,
{
    let batches = stream::iter(texts.chunks(batch_size.max(1)).map(<[String]>::to_vec))
        .map(|batch| async move {
            let vectors = embedder.embed_batch(&batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingServiceError::Malformed(format!(
                    "{} vectors returned for a batch of {}",
                    vectors.len(),
                    batch.len()
                )));
            }
            Ok(vectors)
        })
        .buffered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

/// Builds the configured embedder wrapped in the retry policy.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingServiceError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(RetryingEmbedder::new(
            HashingEmbedder::new(config.dimensions),
            config.retry,
        ))),
        EmbeddingProvider::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                EmbeddingServiceError::Config("http provider requires an endpoint".to_string())
            })?;
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());

            let embedder = HttpEmbedder::new(
                endpoint,
                &config.model,
                config.dimensions,
                api_key,
                config.retry.attempt_timeout,
            )?;
            Ok(Arc::new(RetryingEmbedder::new(embedder, config.retry)))
        }
    }
}

//! Text embeddings for article clustering.
//!
//! # Architecture
//!
//! - [`EmbeddingProvider`]: the collaborator that turns text into a vector
//! - [`OpenAiEmbeddings`]: an OpenAI-compatible `/v1/embeddings` client,
//!   constructed explicitly and passed to whoever needs it
//! - [`embed_all`]: batched retrieval with per-request retry
//!
//! # Degrade, don't fail
//!
//! A request that still fails after the configured retries yields a zero
//! vector. Zero vectors have zero cosine similarity to everything, so those
//! articles end up as noise and are kept rather than dropped.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Trait for anything that can embed a piece of text.
pub trait EmbeddingProvider {
    /// Embed `text`. Errors are treated as transient by callers.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>>;
}

/// Knobs for [`embed_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOptions {
    pub model: String,
    pub base_url: String,
    /// Expected vector length; other lengths count as a failed attempt.
    pub dimensions: usize,
    /// Body characters included after the title.
    pub max_chars: usize,
    /// Requests in flight together; the next batch waits for this one.
    pub batch_size: usize,
    /// Attempts per text before falling back to a zero vector.
    pub retries: usize,
    #[serde(with = "secs")]
    pub retry_delay: Duration,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com".to_string(),
            dimensions: 1536,
            max_chars: 1000,
            batch_size: 30,
            retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// OpenAI-compatible embeddings client.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for OpenAiEmbeddings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbeddings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiEmbeddings {
    pub fn new(client: reqwest::Client, api_key: String, options: &EmbeddingOptions) -> Self {
        Self {
            client,
            api_key,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            model: options.model.clone(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        let req = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| "empty embedding response".into())
    }
}

/// Embed one text, retrying with a fixed delay, zero vector on exhaustion.
#[instrument(level = "debug", skip_all, fields(index = index))]
pub async fn embed_with_retry<P: EmbeddingProvider>(
    provider: &P,
    index: usize,
    text: &str,
    options: &EmbeddingOptions,
) -> Vec<f32> {
    if text.trim().is_empty() {
        debug!(index, "No usable text; using zero vector");
        return vec![0.0; options.dimensions];
    }

    let attempts = options.retries.max(1);
    for attempt in 1..=attempts {
        match provider.embed(text).await {
            Ok(v) if v.len() == options.dimensions => return v,
            Ok(v) => {
                warn!(
                    index,
                    attempt,
                    expected = options.dimensions,
                    found = v.len(),
                    "Embedding has the wrong dimension"
                );
            }
            Err(e) => {
                warn!(index, attempt, max = attempts, error = %e, "Embedding request failed");
            }
        }
        if attempt < attempts {
            sleep(options.retry_delay).await;
        }
    }

    error!(index, attempts, "Embedding retries exhausted; using zero vector");
    vec![0.0; options.dimensions]
}

/// Embed every text, `batch_size` requests at a time.
///
/// # Arguments
///
/// * `provider` - Embedding backend
/// * `texts` - Texts to embed
/// * `options` - Batch size, retry count and delay, expected dimensions
///
/// # Returns
///
/// One vector per input, in input order, each of length
/// `options.dimensions`. A text that still fails after its retries gets a zero
/// vector, so one bad request never aborts the batch.
///
/// # Examples
///
/// ```ignore
/// let provider = OpenAiEmbeddings::new(client, api_key, &options);
/// let vectors = embed_all(&provider, &texts, &options).await;
/// assert_eq!(vectors.len(), texts.len());
/// ```
#[instrument(level = "info", skip_all, fields(count = texts.len(), batch_size = options.batch_size))]
pub async fn embed_all<P: EmbeddingProvider>(
    provider: &P,
    texts: &[String],
    options: &EmbeddingOptions,
) -> Vec<Vec<f32>> {
    let t0 = Instant::now();
    let batch_size = options.batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let offset = batch_no * batch_size;
        let results = join_all(
            batch
                .iter()
                .enumerate()
                .map(|(i, text)| embed_with_retry(provider, offset + i, text, options)),
        )
        .await;
        embeddings.extend(results);
        info!(batch = batch_no + 1, total_batches, done = embeddings.len(), "Embedded batch");
    }

    let zero = embeddings.iter().filter(|v| v.iter().all(|x| *x == 0.0)).count();
    info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        zero_vectors = zero,
        "Embedding complete"
    );
    embeddings
}

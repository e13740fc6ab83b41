//! Embedding provider abstraction and vector utilities.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when `embedding.provider = "disabled"`.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//!
//! Also provides the helpers used at the index storage boundary:
//! - [`vec_to_blob`]: downcast `f64` to `f32` and pack as little-endian bytes
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//! - [`cosine_distance`]: `1 − cosine similarity`, the ranking metric
//!
//! # Truncation
//!
//! Long inputs are split into `chunk_chars`-character chunks and only the
//! first chunk is embedded. A commit's embedding therefore reflects its
//! header, message, and the start of its patch.
//!
//! # Failures
//!
//! Nothing here retries. A failed HTTP call, an empty response, or a vector
//! of the wrong length is an [`Error::Embedding`] and ends the run.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::{ConfigSnapshot, EmbeddingConfig};
use crate::error::{Error, Result};

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `512`).
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

// ============ Disabled Provider ============

/// An embedder that always fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f64>> {
        Err(Error::Embedding("embedding provider is disabled".to_string()))
    }
}

// ============ OpenAI Provider ============

/// Embedder backed by `POST {base_url}/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable. The configured
/// dimensionality is passed through as the request's `dimensions` field.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    chunk_chars: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, snapshot: &ConfigSnapshot) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Embedding("OPENAI_API_KEY environment variable not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: snapshot.model.clone(),
            dims: snapshot.dimensions as usize,
            chunk_chars: config.chunk_chars,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let chunks = split_into_chunks(text, self.chunk_chars);
        let first = chunks
            .first()
            .ok_or_else(|| Error::Embedding("cannot embed empty text".to_string()))?;
        if chunks.len() > 1 {
            debug!(
                chunks = chunks.len(),
                "input longer than one chunk, embedding the first only"
            );
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": [first],
            "dimensions": self.dims,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid response body: {}", e)))?;

        let vector = parse_openai_response(&json)?;
        check_dims(&vector, self.dims)?;
        Ok(vector)
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f64>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| Error::Embedding("no embedding data returned".to_string()))?;

    let values = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Embedding("invalid response: missing embedding".to_string()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| Error::Embedding(format!("non-numeric embedding value: {}", v)))
        })
        .collect()
}

/// Reject vectors whose length differs from the configured dimensionality.
pub fn check_dims(vector: &[f64], dims: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::Embedding("empty embedding returned".to_string()));
    }
    if vector.len() != dims {
        return Err(Error::Embedding(format!(
            "expected {} dimensions, got {}",
            dims,
            vector.len()
        )));
    }
    Ok(())
}

/// Create the [`Embedder`] named by `config.provider`.
pub fn create_embedder(
    config: &EmbeddingConfig,
    snapshot: &ConfigSnapshot,
) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config, snapshot)?)),
        other => Err(Error::Embedding(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Split `text` into chunks of at most `chunk_chars` characters.
///
/// Splits on `char` boundaries, never inside a multi-byte character.
pub fn split_into_chunks(text: &str, chunk_chars: usize) -> Vec<&str> {
    if chunk_chars == 0 {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Encode a vector as a BLOB of little-endian `f32` values.
///
/// This is where full `f64` precision is deliberately dropped: the index
/// stores single precision, the note cache keeps the original.
pub fn vec_to_blob(vec: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&(v as f32).to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]; returns `None` if the length is not a multiple
/// of 4.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Cosine distance between two single-precision vectors.
///
/// Returns a value in `[0.0, 2.0]`: `0.0` for identical direction, `1.0`
/// for orthogonal, `2.0` for opposite. Empty vectors, vectors of different
/// lengths, and zero vectors are treated as orthogonal (`1.0`).
///
/// # Formula
///
/// ```text
///                 a · b
/// d(a, b) = 1 − ─────────
///               ‖a‖ × ‖b‖
/// ```
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 1.0;
    }

    1.0 - dot / denom
}

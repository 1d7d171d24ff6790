//! Embedding collaborator port and adapters.
//!
//! The [`EmbeddingService`] trait is the only thing the pipeline knows about
//! embeddings. Two adapters ship with the crate:
//! - **[`OpenAiEmbedding`]** — calls an OpenAI-compatible `/embeddings`
//!   endpoint over HTTP with a per-request timeout. No internal retries:
//!   a failed or timed-out call is surfaced to the orchestrator as-is.
//! - **[`DisabledEmbedding`]** — always errors; used when embeddings are not
//!   configured.
//!
//! Also provides the vector utilities shared by storage and search:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Port for the external embedding model.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order. The default
    /// implementation fans out sequentially, one call per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Instantiate the configured embedding adapter.
pub fn create_service(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedding)),
        "openai" => Ok(Arc::new(OpenAiEmbedding::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled adapter ============

/// A no-op adapter that always errors. Lets the ingest and ask surfaces give
/// a clear message when embeddings are not configured.
pub struct DisabledEmbedding;

#[async_trait]
impl EmbeddingService for DisabledEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled; set [embedding] provider in config")
    }
}

// ============ OpenAI-compatible adapter ============

/// Embedding adapter for OpenAI-compatible `/embeddings` endpoints.
///
/// Requires the `OPENAI_API_KEY` environment variable. The request carries
/// the configured timeout; on expiry the error propagates immediately, since
/// the pipeline favors fail-fast over masking upstream latency.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("embedding.model required for the openai provider")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("embedding API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("embedding response was not valid JSON")?;

        let mut vectors = parse_embeddings_response(&json)?;
        vectors
            .pop()
            .context("embedding response contained no vectors")
    }
}

/// Extract the `data[].embedding` arrays in input order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .context("invalid embedding response: missing data array")?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .context("invalid embedding response: missing embedding")?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vec.is_empty() {
            bail!("invalid embedding response: empty vector");
        }
        vectors.push(vec);
    }
    Ok(vectors)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB of little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1, 1]`. Returns `0.0` for
/// empty or mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Cosine similarity mapped onto the `[0, 1]` scale the confidence policy is
/// calibrated against. Negative cosine (opposed directions) clamps to zero.
pub fn unit_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs_are_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn unit_similarity_clamps_negative_cosine() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert_eq!(unit_similarity(&a, &b), 0.0);
        assert!((unit_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_embeddings_response_extracts_vectors() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2], "index": 0 },
                { "embedding": [0.3, 0.4], "index": 1 }
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn parse_embeddings_response_rejects_malformed_payloads() {
        assert!(parse_embeddings_response(&serde_json::json!({})).is_err());
        assert!(
            parse_embeddings_response(&serde_json::json!({ "data": [{ "embedding": [] }] }))
                .is_err()
        );
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let provider = DisabledEmbedding;
        assert!(provider.embed("text").await.is_err());
        assert!(provider.embed_batch(&["a".into()]).await.is_err());
    }
}

//! Embedding backend abstraction.
//!
//! The [`Embedder`] trait is the capability seam for turning text into
//! vectors; the production implementation calls Ollama's embeddings API,
//! and tests substitute deterministic fakes.
//!
//! Vectors are L2-normalized before they enter the index, so cosine
//! similarity at query time reduces to a dot product.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::RagError;
use crate::models::Embedding;

/// Maps text to a fixed-length vector. Implementations must be
/// deterministic for identical input and report a stable model identity;
/// one index instance only accepts vectors from one model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The model identity recorded in the index (e.g. `"nomic-embed-text"`).
    fn model_id(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Embedding, RagError>;
}

/// Embedder backed by Ollama's `POST /api/embeddings`.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingFailure(format!(
                "embeddings API returned {}: {}",
                status, detail
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingFailure(e.to_string()))?;

        let vector: Vec<f32> = json
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::EmbeddingFailure("response missing 'embedding' array".to_string())
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vector.is_empty() {
            return Err(RagError::EmbeddingFailure(
                "embeddings API returned an empty vector".to_string(),
            ));
        }

        Ok(Embedding {
            vector,
            model_id: self.model.clone(),
        })
    }
}

/// Scale a vector to unit length. Zero vectors are returned unchanged so
/// they score 0 against everything instead of producing NaN.
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// Dot product. Over L2-normalized inputs this is cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

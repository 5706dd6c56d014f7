//! Generation backend abstraction.
//!
//! The [`Generator`] trait is the capability seam for the answer
//! orchestrator; the production implementation calls Ollama's generate API.
//! Every call is wrapped in the caller-supplied timeout and surfaces
//! [`RagError::GenerationTimeout`] instead of hanging.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::RagError;

/// Sampling and compute parameters for one generation call. Fields default
/// from `[generation]` config and may be overridden per request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    /// Device-affinity hint (layers offloaded to GPU, in Ollama terms).
    pub device_hint: u32,
    pub temperature: f32,
}

/// Produces text from a prompt. Implementations must not mutate any engine
/// state; the orchestrator owns timeout handling via [`generate_with_timeout`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError>;
}

/// Run a generation call under a timeout.
pub async fn generate_with_timeout(
    generator: &dyn Generator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<String, RagError> {
    tokio::time::timeout(timeout, generator.generate(request))
        .await
        .map_err(|_| RagError::GenerationTimeout(timeout))?
}

/// Generator backed by Ollama's `POST /api/generate` (non-streaming).
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, RagError> {
        // No client-level timeout; the orchestrator applies the configured
        // one per call so a request override is possible later.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::GenerationFailure(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "options": {
                "num_predict": request.max_tokens,
                "num_gpu": request.device_hint,
                "temperature": request.temperature,
            },
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::GenerationFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailure(format!(
                "generate API returned {}: {}",
                status, detail
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::GenerationFailure(e.to_string()))?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| {
                RagError::GenerationFailure("response missing 'response' field".to_string())
            })?;

        Ok(text.trim().to_string())
    }
}

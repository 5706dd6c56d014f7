//! HTTP surface for the engine.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Re-ingest the corpus (or one document via `{"scope": path}`) |
//! | `POST` | `/chat` | Answer a question over the indexed corpus |
//! | `GET`  | `/health` | Whether the index is ready to serve searches |
//!
//! Error responses are JSON: `{"error": {"code": "...", "message": "..."}}`.
//! Index/model drift surfaces as a 500-class condition (re-ingestion
//! required); generation backend problems surface as 502/504 with retry
//! guidance; a rejected concurrent rebuild is 409.
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::engine::RagEngine;
use crate::error::RagError;
use crate::ingest::IngestScope;
use crate::models::{Answer, IngestReport, QueryParams};

/// Start the HTTP server with the configured Ollama backends. Runs until
/// the process terminates.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(RagEngine::new(config.clone())?);
    let bind = config.server.bind.clone();

    let app = router(engine);
    info!(%bind, "listening");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

/// Build the router for a given engine. Separated from [`run_server`] so
/// tests can drive handlers without binding a socket.
pub fn router(engine: Arc<RagEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Map engine errors onto the HTTP error contract.
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(rag) = err.downcast_ref::<RagError>() {
        let (status, code) = match rag {
            RagError::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RagError::RebuildInProgress => (StatusCode::CONFLICT, "rebuild_in_progress"),
            RagError::DimensionMismatch { .. } | RagError::EmbeddingModelMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "index_model_drift")
            }
            RagError::GenerationTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "generation_timeout"),
            RagError::GenerationFailure(_) | RagError::EmbeddingFailure(_) => {
                (StatusCode::BAD_GATEWAY, "backend_unavailable")
            }
            RagError::Extraction { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "extraction_failed"),
        };
        let message = match rag {
            RagError::DimensionMismatch { .. } | RagError::EmbeddingModelMismatch { .. } => {
                format!("{}; re-ingestion required", rag)
            }
            RagError::GenerationTimeout(_) | RagError::GenerationFailure(_) => {
                format!("answer unavailable: {}; retry later", rag)
            }
            other => other.to_string(),
        };
        return AppError {
            status,
            code,
            message,
        };
    }

    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

// ============ POST /ingest ============

/// Request body for `POST /ingest`. An absent body or absent `scope` means
/// a full corpus rescan.
#[derive(Deserialize, Default)]
struct IngestRequest {
    scope: Option<String>,
}

async fn handle_ingest(
    State(engine): State<Arc<RagEngine>>,
    body: Option<Json<IngestRequest>>,
) -> Result<Json<IngestReport>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let scope = match request.scope {
        Some(path) => IngestScope::Document(path),
        None => IngestScope::All,
    };

    let report = engine.ingest(scope).await.map_err(classify_error)?;
    Ok(Json(report))
}

// ============ POST /chat ============

/// Request body for `POST /chat`. `path_contains` and `path_exact` combine
/// as AND when both are present.
#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    top_k: Option<usize>,
    num_predict: Option<u32>,
    num_gpu: Option<u32>,
    temperature: Option<f32>,
    path_contains: Option<String>,
    path_exact: Option<String>,
}

async fn handle_chat(
    State(engine): State<Arc<RagEngine>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Answer>, AppError> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if let Some(top_k) = request.top_k {
        if top_k == 0 {
            return Err(bad_request("top_k must be >= 1"));
        }
    }

    let params = QueryParams {
        question: request.question,
        top_k: request.top_k,
        path_contains: request.path_contains,
        path_exact: request.path_exact,
        num_predict: request.num_predict,
        num_gpu: request.num_gpu,
        temperature: request.temperature,
    };

    let answer = engine
        .ask(&params)
        .await
        .map_err(|e| classify_error(e.into()))?;
    Ok(Json(answer))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    /// Whether an index snapshot has been published and `search` can serve.
    ready: bool,
    indexed_chunks: usize,
    version: String,
}

async fn handle_health(State(engine): State<Arc<RagEngine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ready: engine.is_ready(),
        indexed_chunks: engine.index().len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn engine_errors_map_to_the_documented_statuses() {
        let cases: Vec<(RagError, StatusCode, &str)> = vec![
            (
                RagError::DocumentNotFound("ghost.md".to_string()),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                RagError::RebuildInProgress,
                StatusCode::CONFLICT,
                "rebuild_in_progress",
            ),
            (
                RagError::GenerationTimeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
                "generation_timeout",
            ),
            (
                RagError::EmbeddingFailure("connection refused".to_string()),
                StatusCode::BAD_GATEWAY,
                "backend_unavailable",
            ),
            (
                RagError::DimensionMismatch {
                    expected: 768,
                    got: 384,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "index_model_drift",
            ),
        ];
        for (err, status, code) in cases {
            let app = classify_error(err.into());
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }
}

//! Error taxonomy for the ingestion and query paths.
//!
//! Per-document extraction failures are recorded in the ingest report and
//! never abort the batch; everything else aborts only the call it occurred in.
//! The index is never left observable in a partially-written state.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the core engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be turned into text (malformed or unsupported).
    /// Recorded per-document during ingestion; ingestion continues.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    /// Invalid chunking or retrieval configuration. Fatal to the ingest call.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Query vector dimensionality does not match the published index.
    /// Indicates index/model drift; requires re-ingestion.
    #[error("query vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The embedding backend answered with a different model identity than
    /// the one the index was built with.
    #[error("embedding model '{got}' does not match index model '{expected}'")]
    EmbeddingModelMismatch { expected: String, got: String },

    /// The embedding backend failed or returned an unusable response.
    #[error("embedding backend failed: {0}")]
    EmbeddingFailure(String),

    /// The generation backend did not answer within the configured timeout.
    #[error("generation backend timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// The generation backend failed or returned an unusable response.
    #[error("generation backend failed: {0}")]
    GenerationFailure(String),

    /// A rebuild was requested while one was in flight and the configured
    /// policy is `reject`.
    #[error("an index rebuild is already in progress")]
    RebuildInProgress,

    /// A scoped ingest named a path that is neither in the corpus nor in
    /// the published index.
    #[error("document not found in corpus: {0}")]
    DocumentNotFound(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

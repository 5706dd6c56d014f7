//! Core data types flowing through the ingestion and query pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata snapshot of an ingested document. Identity is the path relative
/// to the corpus root; re-ingestion supersedes the old version under the
/// same path.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub path: String,
    /// SHA-256 of the raw file bytes; unchanged hash means the document is
    /// skipped on re-ingestion.
    pub content_hash: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub page_count: usize,
}

/// One page of extracted text. Page numbers are 1-based; plain-text formats
/// produce a single page.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

/// A contiguous slice of a document's extracted text.
///
/// `start..end` is a character-offset range into the concatenated extracted
/// text. Ranges within a document are monotonically increasing and overlap
/// only by the configured overlap window. The ID is a SHA-256 over the
/// document path and the offset range, so re-chunking unchanged text yields
/// identical IDs.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Sequence index within the document, starting at 0.
    pub seq: usize,
    pub start: usize,
    pub end: usize,
    /// Page the chunk starts on (1-based).
    pub page: usize,
    pub text: String,
}

/// A fixed-dimensionality vector plus the identity of the model that
/// produced it. One index instance holds vectors from exactly one model.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// What the vector index stores per chunk: the chunk, its L2-normalized
/// vector, and a snapshot of the owning document's metadata.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    /// L2-normalized at construction so search is a plain dot product.
    pub vector: Vec<f32>,
    pub doc: DocumentMeta,
}

/// A retrieval hit: a chunk with its similarity score and source path.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub path: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Per-request query parameters. Unset retrieval/sampling fields fall back
/// to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub question: String,
    pub top_k: Option<usize>,
    pub path_contains: Option<String>,
    pub path_exact: Option<String>,
    pub num_predict: Option<u32>,
    pub num_gpu: Option<u32>,
    pub temperature: Option<f32>,
}

/// One source cited in an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub path: String,
    pub chunk_id: String,
    pub score: f32,
    /// Similarity clamped to [0, 1].
    pub confidence: f32,
}

/// A generated answer with its cited sources. `sources` lists only the
/// chunks that made it into the final prompt, ordered by descending score.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub overall_confidence: f32,
}

/// Outcome of processing one document during an ingest run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Extracted, chunked, embedded, and queued for the rebuilt index.
    Indexed { chunks: usize },
    /// Content hash matched the published index; entries carried over.
    Unchanged,
    /// Extraction produced no text; recorded as a warning, zero chunks.
    Empty,
    /// Extraction or embedding failed; the rest of the batch continued.
    /// The document's previously published entries, if any, are kept.
    Failed { reason: String },
    /// Not started because the ingest scope was cancelled. Previously
    /// published entries are kept.
    Skipped,
    /// The document no longer exists in the corpus; its entries were
    /// dropped from the index.
    Removed,
}

/// Per-document outcome with the document it applies to.
#[derive(Debug, Clone, Serialize)]
pub struct DocReport {
    pub path: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Summary of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: Vec<DocReport>,
    pub docs_indexed: usize,
    pub docs_unchanged: usize,
    pub docs_failed: usize,
    pub chunks_indexed: usize,
}

impl IngestReport {
    pub fn from_outcomes(documents: Vec<DocReport>) -> Self {
        let mut report = IngestReport {
            documents,
            docs_indexed: 0,
            docs_unchanged: 0,
            docs_failed: 0,
            chunks_indexed: 0,
        };
        for doc in &report.documents {
            match &doc.outcome {
                IngestOutcome::Indexed { chunks } => {
                    report.docs_indexed += 1;
                    report.chunks_indexed += chunks;
                }
                IngestOutcome::Unchanged => report.docs_unchanged += 1,
                IngestOutcome::Failed { .. } => report.docs_failed += 1,
                IngestOutcome::Empty | IngestOutcome::Skipped | IngestOutcome::Removed => {}
            }
        }
        report
    }
}

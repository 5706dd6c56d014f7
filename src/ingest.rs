//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow per document: corpus scan → extraction →
//! chunking → embedding → index entries. Documents are processed by a
//! bounded worker pool; stages within one document run sequentially.
//!
//! The pipeline accumulates entries for the whole scope and publishes them
//! with one index rebuild, so queries always observe a complete corpus
//! state. Unchanged documents (same content hash as the published version)
//! are carried over without any embedding calls, which makes re-running an
//! ingest with no source changes cheap and mutation-free.
//!
//! Per-document failures are recorded and never abort the batch; the run as
//! a whole fails only when every attempted document failed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::corpus::{self, ScannedDocument};
use crate::embedding::{l2_normalize, Embedder};
use crate::error::RagError;
use crate::extract::extract_pages;
use crate::index::VectorIndex;
use crate::models::{DocReport, DocumentMeta, IndexEntry, IngestOutcome, IngestReport};

/// What an ingest run covers: the whole corpus, or one document path
/// (relative to the corpus root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestScope {
    All,
    Document(String),
}

/// Result of processing one document off the worker pool.
struct DocResult {
    path: String,
    outcome: IngestOutcome,
    entries: Vec<IndexEntry>,
}

/// Run an ingest over `scope` and publish the result as one atomic rebuild.
///
/// `cancel` is checked between documents: the in-flight documents finish,
/// no new ones start, and unstarted documents are reported as skipped.
/// Cancellation does not roll back the rebuild; skipped documents keep
/// their previously published entries.
///
/// Callers must serialize invocations (see `RagEngine`); this function
/// assumes it is the only rebuild in flight.
pub async fn run_ingest(
    config: &Config,
    index: &Arc<VectorIndex>,
    embedder: &Arc<dyn Embedder>,
    scope: IngestScope,
    cancel: &Arc<AtomicBool>,
) -> Result<IngestReport> {
    // Invalid chunking configuration is fatal to the whole call.
    if config.chunking.overlap >= config.chunking.chunk_size {
        return Err(RagError::Config(format!(
            "overlap ({}) must be strictly less than chunk_size ({})",
            config.chunking.overlap, config.chunking.chunk_size
        ))
        .into());
    }

    let mut scanned = corpus::scan_corpus(&config.corpus)?;

    let published_docs = index.documents();
    // Carried entries are only valid if the published index was built with
    // the same embedding model; on model change everything is re-embedded.
    let model_matches = index
        .model_id()
        .map(|m| m == embedder.model_id())
        .unwrap_or(true);

    if let IngestScope::Document(ref path) = scope {
        scanned.retain(|d| &d.rel_path == path);
        if scanned.is_empty() {
            if !published_docs.contains_key(path) {
                return Err(RagError::DocumentNotFound(path.clone()).into());
            }
            // The document was deleted from the corpus since the last
            // publish; drop its entries and leave everything else alone.
            index.remove(path);
            info!(path = %path, "removed deleted document from index");
            return Ok(IngestReport::from_outcomes(vec![DocReport {
                path: path.clone(),
                outcome: IngestOutcome::Removed,
            }]));
        }
    }

    info!(
        scope = ?scope,
        documents = scanned.len(),
        workers = config.ingest.workers,
        "starting ingest"
    );

    let semaphore = Arc::new(Semaphore::new(config.ingest.workers));
    let mut join_set: JoinSet<DocResult> = JoinSet::new();
    let mut results: Vec<DocResult> = Vec::new();

    for doc in scanned {
        let permit = semaphore.clone().acquire_owned().await?;

        // Checked after the permit wait so a cancel arriving while documents
        // queue for a worker still stops them from starting.
        if cancel.load(Ordering::SeqCst) {
            results.push(DocResult {
                path: doc.rel_path.clone(),
                outcome: IngestOutcome::Skipped,
                entries: carried_entries(index, &doc.rel_path, model_matches),
            });
            continue;
        }
        let config = config.clone();
        let embedder = embedder.clone();
        let unchanged_hash = if model_matches {
            published_docs.get(&doc.rel_path).map(|m| m.content_hash.clone())
        } else {
            None
        };
        let carried = carried_entries(index, &doc.rel_path, model_matches);

        join_set.spawn(async move {
            let _permit = permit;
            process_document(&config, embedder.as_ref(), &doc, unchanged_hash, carried).await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        results.push(joined?);
    }

    // Deterministic report order regardless of completion order.
    results.sort_by(|a, b| a.path.cmp(&b.path));

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for result in &results {
        match &result.outcome {
            IngestOutcome::Failed { reason } => {
                warn!(path = %result.path, %reason, "document failed");
                failed += 1;
            }
            IngestOutcome::Skipped => {}
            _ => succeeded += 1,
        }
    }

    if failed > 0 && succeeded == 0 {
        bail!(
            "ingest failed: all {} attempted documents failed (first: {})",
            failed,
            results
                .iter()
                .find_map(|r| match &r.outcome {
                    IngestOutcome::Failed { reason } => Some(reason.as_str()),
                    _ => None,
                })
                .unwrap_or("unknown")
        );
    }

    // A run cancelled before any document started must not publish; a fresh
    // index would otherwise report ready while holding nothing.
    let all_skipped = !results.is_empty()
        && results
            .iter()
            .all(|r| r.outcome == IngestOutcome::Skipped);
    if all_skipped {
        info!("ingest cancelled before any document started; index unchanged");
        let documents = results
            .into_iter()
            .map(|r| DocReport {
                path: r.path,
                outcome: r.outcome,
            })
            .collect();
        return Ok(IngestReport::from_outcomes(documents));
    }

    // Union of everything this scope produced or kept. A single-document
    // scope additionally carries every other published document unchanged,
    // unless the embedding model changed: old-model vectors never enter a
    // rebuild published under the new model identity.
    let mut entries_by_path: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
    for result in &mut results {
        entries_by_path.insert(result.path.clone(), std::mem::take(&mut result.entries));
    }
    if model_matches {
        if let IngestScope::Document(ref scoped) = scope {
            for path in published_docs.keys() {
                if path != scoped && !entries_by_path.contains_key(path) {
                    entries_by_path.insert(path.clone(), index.entries_for(path));
                }
            }
        }
    }

    let all_entries: Vec<IndexEntry> = entries_by_path.into_values().flatten().collect();
    let total = all_entries.len();
    index.rebuild(embedder.model_id(), all_entries)?;
    info!(entries = total, "published rebuilt index");

    let documents: Vec<DocReport> = results
        .into_iter()
        .map(|r| DocReport {
            path: r.path,
            outcome: r.outcome,
        })
        .collect();

    Ok(IngestReport::from_outcomes(documents))
}

/// Previously published entries for `path`, or nothing when the embedding
/// model changed. Old-model vectors must never survive into a rebuild
/// published under the new model identity.
fn carried_entries(index: &VectorIndex, path: &str, model_matches: bool) -> Vec<IndexEntry> {
    if model_matches {
        index.entries_for(path)
    } else {
        Vec::new()
    }
}

/// Extract, chunk, and embed one document. Stages are sequential within a
/// document; errors become a `Failed` outcome that keeps the previously
/// published entries.
async fn process_document(
    config: &Config,
    embedder: &dyn Embedder,
    doc: &ScannedDocument,
    unchanged_hash: Option<String>,
    carried: Vec<IndexEntry>,
) -> DocResult {
    let path = doc.rel_path.clone();

    let (bytes, mut meta) = match corpus::load_document(doc) {
        Ok(loaded) => loaded,
        Err(e) => {
            return DocResult {
                path,
                outcome: IngestOutcome::Failed {
                    reason: e.to_string(),
                },
                entries: carried,
            }
        }
    };

    if unchanged_hash.as_deref() == Some(meta.content_hash.as_str()) {
        return DocResult {
            path,
            outcome: IngestOutcome::Unchanged,
            entries: carried,
        };
    }

    let pages = match extract_pages(&path, &bytes, &doc.format) {
        Ok(pages) => pages,
        Err(e) => {
            return DocResult {
                path,
                outcome: IngestOutcome::Failed {
                    reason: e.to_string(),
                },
                entries: carried,
            }
        }
    };
    meta.page_count = pages.len();

    let chunks = match chunk_document(
        &path,
        &pages,
        config.chunking.chunk_size,
        config.chunking.overlap,
    ) {
        Ok(chunks) => chunks,
        Err(e) => {
            return DocResult {
                path,
                outcome: IngestOutcome::Failed {
                    reason: e.to_string(),
                },
                entries: carried,
            }
        }
    };

    if chunks.is_empty() {
        warn!(path = %meta.path, "no extractable text");
        return DocResult {
            path,
            outcome: IngestOutcome::Empty,
            entries: Vec::new(),
        };
    }

    match embed_chunks(embedder, &meta, chunks).await {
        Ok(entries) => {
            let count = entries.len();
            DocResult {
                path,
                outcome: IngestOutcome::Indexed { chunks: count },
                entries,
            }
        }
        Err(e) => DocResult {
            path,
            outcome: IngestOutcome::Failed {
                reason: e.to_string(),
            },
            entries: carried,
        },
    }
}

async fn embed_chunks(
    embedder: &dyn Embedder,
    meta: &DocumentMeta,
    chunks: Vec<crate::models::Chunk>,
) -> Result<Vec<IndexEntry>, RagError> {
    let mut entries = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let embedding = embedder.embed(&chunk.text).await?;
        if embedding.model_id != embedder.model_id() {
            return Err(RagError::EmbeddingModelMismatch {
                expected: embedder.model_id().to_string(),
                got: embedding.model_id,
            });
        }
        entries.push(IndexEntry {
            chunk,
            vector: l2_normalize(&embedding.vector),
            doc: meta.clone(),
        });
    }
    Ok(entries)
}

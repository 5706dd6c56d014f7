//! Retrieval engine: query embedding plus index search.

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::index::{PathFilter, VectorIndex};
use crate::models::{QueryParams, RetrievedChunk};

/// Embed the question and rank it against the published index.
///
/// Uses `params.top_k` or the configured default (6). The embedding model
/// must match the identity the index was built with; drift fails the query
/// and requires re-ingestion. An empty or unmatched corpus yields an empty
/// result without calling the embedding backend.
pub async fn retrieve(
    config: &RetrievalConfig,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    params: &QueryParams,
) -> Result<Vec<RetrievedChunk>, RagError> {
    if index.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(index_model) = index.model_id() {
        if index_model != embedder.model_id() {
            return Err(RagError::EmbeddingModelMismatch {
                expected: index_model,
                got: embedder.model_id().to_string(),
            });
        }
    }

    let embedding = embedder.embed(&params.question).await?;
    if embedding.model_id != embedder.model_id() {
        return Err(RagError::EmbeddingModelMismatch {
            expected: embedder.model_id().to_string(),
            got: embedding.model_id,
        });
    }

    let top_k = params.top_k.unwrap_or(config.default_top_k);
    let filter = PathFilter {
        contains: params.path_contains.clone(),
        exact: params.path_exact.clone(),
    };

    let hits = index.search(&embedding.vector, top_k, &filter)?;
    debug!(hits = hits.len(), top_k, "retrieval complete");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_normalize;
    use crate::models::{Chunk, DocumentMeta, Embedding, IndexEntry};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        model: String,
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(model: &str, vector: Vec<f32>) -> Self {
            Self {
                model: model.to_string(),
                vector,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_id(&self) -> &str {
            &self.model
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding {
                vector: self.vector.clone(),
                model_id: self.model.clone(),
            })
        }
    }

    fn entry(path: &str, seq: usize, vector: &[f32]) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: format!("{}#{}", path, seq),
                seq,
                start: 0,
                end: 10,
                page: 1,
                text: format!("text {}", seq),
            },
            vector: l2_normalize(vector),
            doc: DocumentMeta {
                path: path.to_string(),
                content_hash: "h".to_string(),
                size: 1,
                modified: Utc::now(),
                page_count: 1,
            },
        }
    }

    fn params(question: &str) -> QueryParams {
        QueryParams {
            question: question.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_index_yields_empty_result_without_embedding() {
        let index = VectorIndex::new();
        let embedder = FixedEmbedder::new("m", vec![1.0, 0.0]);
        let hits = retrieve(&RetrievalConfig::default(), &index, &embedder, &params("q"))
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_top_k_is_six() {
        let index = VectorIndex::new();
        let entries: Vec<IndexEntry> =
            (0..10).map(|i| entry("doc.md", i, &[1.0, i as f32])).collect();
        index.rebuild("m", entries).unwrap();

        let embedder = FixedEmbedder::new("m", vec![1.0, 0.0]);
        let hits = retrieve(&RetrievalConfig::default(), &index, &embedder, &params("q"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 6);
    }

    #[tokio::test]
    async fn explicit_top_k_wins() {
        let index = VectorIndex::new();
        let entries: Vec<IndexEntry> =
            (0..10).map(|i| entry("doc.md", i, &[1.0, i as f32])).collect();
        index.rebuild("m", entries).unwrap();

        let embedder = FixedEmbedder::new("m", vec![1.0, 0.0]);
        let mut query = params("q");
        query.top_k = Some(3);
        let hits = retrieve(&RetrievalConfig::default(), &index, &embedder, &query)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn model_drift_fails_the_query() {
        let index = VectorIndex::new();
        index.rebuild("old-model", vec![entry("doc.md", 0, &[1.0, 0.0])]).unwrap();

        let embedder = FixedEmbedder::new("new-model", vec![1.0, 0.0]);
        let err = retrieve(&RetrievalConfig::default(), &index, &embedder, &params("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_filter_yields_empty_not_error() {
        let index = VectorIndex::new();
        index.rebuild("m", vec![entry("doc.md", 0, &[1.0, 0.0])]).unwrap();

        let embedder = FixedEmbedder::new("m", vec![1.0, 0.0]);
        let mut query = params("q");
        query.path_exact = Some("missing.md".to_string());
        let hits = retrieve(&RetrievalConfig::default(), &index, &embedder, &query)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}

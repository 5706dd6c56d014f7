//! Concurrency-safe vector index with snapshot isolation.
//!
//! The index is an immutable [`Snapshot`] behind `RwLock<Arc<Snapshot>>`.
//! Readers clone the `Arc` once per call and rank against that consistent
//! view; writers build a new snapshot off to the side and publish it with a
//! single pointer swap. A search that started before a rebuild completes
//! finishes against the snapshot it dereferenced, never a mix of old and
//! new entries.
//!
//! Ranking is exact cosine similarity (dot product over L2-normalized
//! vectors) over every eligible entry. Ordering is deterministic: score
//! descending, then chunk sequence ascending, then document path ascending.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::embedding::l2_normalize;
use crate::error::RagError;
use crate::models::{DocumentMeta, IndexEntry, RetrievedChunk};

/// Path predicate for `search`. `contains` and `exact` combine as AND;
/// both unset matches everything.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    pub contains: Option<String>,
    pub exact: Option<String>,
}

impl PathFilter {
    pub fn matches(&self, path: &str) -> bool {
        if let Some(exact) = &self.exact {
            if path != exact {
                return false;
            }
        }
        if let Some(substring) = &self.contains {
            if !path.contains(substring.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.contains.is_none() && self.exact.is_none()
    }
}

/// One published, immutable index state.
#[derive(Debug)]
struct Snapshot {
    entries: Vec<IndexEntry>,
    /// Document metadata keyed by path, for unchanged-document detection.
    docs: HashMap<String, DocumentMeta>,
    dims: usize,
    model_id: String,
    /// Publish counter; 0 means nothing was ever published.
    generation: u64,
}

impl Snapshot {
    fn empty() -> Self {
        Snapshot {
            entries: Vec::new(),
            docs: HashMap::new(),
            dims: 0,
            model_id: String::new(),
            generation: 0,
        }
    }

    fn build(
        model_id: &str,
        entries: Vec<IndexEntry>,
        generation: u64,
    ) -> Result<Self, RagError> {
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        for entry in &entries {
            if entry.vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    got: entry.vector.len(),
                });
            }
        }

        let mut docs = HashMap::new();
        for entry in &entries {
            docs.entry(entry.doc.path.clone())
                .or_insert_with(|| entry.doc.clone());
        }

        Ok(Snapshot {
            entries,
            docs,
            dims,
            model_id: model_id.to_string(),
            generation,
        })
    }
}

/// The single piece of shared mutable state on the query path.
pub struct VectorIndex {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("index lock poisoned").clone()
    }

    fn publish(&self, next: Snapshot) {
        *self.snapshot.write().expect("index lock poisoned") = Arc::new(next);
    }

    /// Whether a snapshot has been published and `search` can serve.
    pub fn is_ready(&self) -> bool {
        self.current().generation > 0
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The embedding model identity the published snapshot was built with,
    /// or `None` before the first publish.
    pub fn model_id(&self) -> Option<String> {
        let snapshot = self.current();
        if snapshot.generation == 0 {
            None
        } else {
            Some(snapshot.model_id.clone())
        }
    }

    /// Document metadata snapshots currently published, keyed by path.
    pub fn documents(&self) -> HashMap<String, DocumentMeta> {
        self.current().docs.clone()
    }

    /// All published entries belonging to one document, in sequence order.
    /// Used by the ingest pipeline to carry unchanged documents over into
    /// a rebuild.
    pub fn entries_for(&self, path: &str) -> Vec<IndexEntry> {
        let snapshot = self.current();
        let mut entries: Vec<IndexEntry> = snapshot
            .entries
            .iter()
            .filter(|e| e.doc.path == path)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.chunk.seq);
        entries
    }

    /// Add or replace entries in place, keyed by chunk ID. Replacement
    /// publishes a new snapshot; in-flight searches finish on the old one.
    pub fn upsert(&self, model_id: &str, batch: Vec<IndexEntry>) -> Result<(), RagError> {
        let current = self.current();
        if current.generation > 0 && current.model_id != model_id {
            return Err(RagError::EmbeddingModelMismatch {
                expected: current.model_id.clone(),
                got: model_id.to_string(),
            });
        }
        if current.dims > 0 {
            for entry in &batch {
                if entry.vector.len() != current.dims {
                    return Err(RagError::DimensionMismatch {
                        expected: current.dims,
                        got: entry.vector.len(),
                    });
                }
            }
        }

        let mut merged: Vec<IndexEntry> = current.entries.clone();
        for entry in batch {
            if let Some(existing) = merged.iter_mut().find(|e| e.chunk.id == entry.chunk.id) {
                *existing = entry;
            } else {
                merged.push(entry);
            }
        }

        let next = Snapshot::build(model_id, merged, current.generation + 1)?;
        self.publish(next);
        Ok(())
    }

    /// Replace the entire index with a new entry set, atomically. The new
    /// snapshot is constructed fully in isolation before the swap, so
    /// readers never observe a partially-populated index.
    pub fn rebuild(&self, model_id: &str, entries: Vec<IndexEntry>) -> Result<(), RagError> {
        let generation = self.current().generation + 1;
        let next = Snapshot::build(model_id, entries, generation)?;
        self.publish(next);
        Ok(())
    }

    /// Delete all entries belonging to one document path.
    pub fn remove(&self, path: &str) {
        let current = self.current();
        let entries: Vec<IndexEntry> = current
            .entries
            .iter()
            .filter(|e| e.doc.path != path)
            .cloned()
            .collect();
        let mut docs = current.docs.clone();
        docs.remove(path);
        let next = Snapshot {
            entries,
            docs,
            dims: current.dims,
            model_id: current.model_id.clone(),
            generation: current.generation + 1,
        };
        self.publish(next);
    }

    /// Exact cosine ranking of every eligible entry against `query_vec`.
    ///
    /// Returns at most `top_k` results; fewer when the eligible set is
    /// smaller. An empty index yields an empty result, not an error.
    pub fn search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filter: &PathFilter,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let snapshot = self.current();
        if snapshot.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query_vec.len() != snapshot.dims {
            return Err(RagError::DimensionMismatch {
                expected: snapshot.dims,
                got: query_vec.len(),
            });
        }

        let query = l2_normalize(query_vec);

        let mut hits: Vec<RetrievedChunk> = snapshot
            .entries
            .iter()
            .filter(|e| filter.matches(&e.doc.path))
            .map(|e| RetrievedChunk {
                chunk: e.chunk.clone(),
                path: e.doc.path.clone(),
                score: crate::embedding::dot(&query, &e.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.seq.cmp(&b.chunk.seq))
                .then(a.path.cmp(&b.path))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use chrono::Utc;

    fn entry(path: &str, seq: usize, vector: &[f32]) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: crate::chunk::chunk_id(path, seq * 10, seq * 10 + 10),
                seq,
                start: seq * 10,
                end: seq * 10 + 10,
                page: 1,
                text: format!("{} chunk {}", path, seq),
            },
            vector: l2_normalize(vector),
            doc: DocumentMeta {
                path: path.to_string(),
                content_hash: format!("hash-{}", path),
                size: 100,
                modified: Utc::now(),
                page_count: 1,
            },
        }
    }

    #[test]
    fn empty_index_is_not_ready_and_returns_no_hits() {
        let index = VectorIndex::new();
        assert!(!index.is_ready());
        let hits = index.search(&[1.0, 0.0], 5, &PathFilter::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn search_ranks_by_cosine_descending() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("a.pdf", 0, &[1.0, 0.0]),
                    entry("a.pdf", 1, &[0.0, 1.0]),
                    entry("b.pdf", 0, &[0.7, 0.7]),
                ],
            )
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3, &PathFilter::default()).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].path, "a.pdf");
        assert_eq!(hits[0].chunk.seq, 0);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[1].path, "b.pdf");
    }

    #[test]
    fn ties_break_on_seq_then_path() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("b.pdf", 1, &[1.0, 0.0]),
                    entry("b.pdf", 0, &[1.0, 0.0]),
                    entry("a.pdf", 0, &[1.0, 0.0]),
                ],
            )
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3, &PathFilter::default()).unwrap();
        // Equal scores: seq asc first, then path asc.
        assert_eq!(
            hits.iter()
                .map(|h| (h.path.as_str(), h.chunk.seq))
                .collect::<Vec<_>>(),
            vec![("a.pdf", 0), ("b.pdf", 0), ("b.pdf", 1)]
        );
    }

    #[test]
    fn repeated_searches_return_identical_order() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("a.pdf", 0, &[0.9, 0.1]),
                    entry("b.pdf", 0, &[0.9, 0.1]),
                    entry("c.pdf", 0, &[0.1, 0.9]),
                ],
            )
            .unwrap();
        let first = index.search(&[1.0, 0.2], 3, &PathFilter::default()).unwrap();
        let second = index.search(&[1.0, 0.2], 3, &PathFilter::default()).unwrap();
        let ids = |hits: &[RetrievedChunk]| {
            hits.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn exact_filter_matches_whole_path_only() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("11.pdf", 0, &[1.0, 0.0]),
                    entry("2011.pdf", 0, &[1.0, 0.0]),
                ],
            )
            .unwrap();

        let filter = PathFilter {
            exact: Some("11.pdf".to_string()),
            contains: None,
        };
        let hits = index.search(&[1.0, 0.0], 10, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "11.pdf");
    }

    #[test]
    fn contains_filter_matches_substring() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("reports/q1.md", 0, &[1.0, 0.0]),
                    entry("notes/q1.md", 0, &[1.0, 0.0]),
                ],
            )
            .unwrap();

        let filter = PathFilter {
            contains: Some("report".to_string()),
            exact: None,
        };
        let hits = index.search(&[1.0, 0.0], 10, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "reports/q1.md");
    }

    #[test]
    fn both_filters_combine_as_and() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("reports/q1.md", 0, &[1.0, 0.0]),
                    entry("reports/q2.md", 0, &[1.0, 0.0]),
                ],
            )
            .unwrap();

        let filter = PathFilter {
            contains: Some("reports".to_string()),
            exact: Some("reports/q2.md".to_string()),
        };
        let hits = index.search(&[1.0, 0.0], 10, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "reports/q2.md");
    }

    #[test]
    fn top_k_larger_than_eligible_set_returns_all() {
        let index = VectorIndex::new();
        index
            .rebuild("m", vec![entry("a.pdf", 0, &[1.0, 0.0])])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 50, &PathFilter::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = VectorIndex::new();
        index
            .rebuild("m", vec![entry("a.pdf", 0, &[1.0, 0.0])])
            .unwrap();
        let err = index
            .search(&[1.0, 0.0, 0.0], 5, &PathFilter::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn mixed_dimensionality_rebuild_is_rejected() {
        let index = VectorIndex::new();
        let err = index
            .rebuild(
                "m",
                vec![entry("a.pdf", 0, &[1.0, 0.0]), entry("b.pdf", 0, &[1.0, 0.0, 0.0])],
            )
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        // Failed rebuild must not publish anything.
        assert!(!index.is_ready());
    }

    #[test]
    fn upsert_replaces_by_chunk_id() {
        let index = VectorIndex::new();
        index
            .rebuild("m", vec![entry("a.pdf", 0, &[1.0, 0.0])])
            .unwrap();

        let mut replacement = entry("a.pdf", 0, &[0.0, 1.0]);
        replacement.chunk.text = "updated".to_string();
        index.upsert("m", vec![replacement]).unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 1, &PathFilter::default()).unwrap();
        assert_eq!(hits[0].chunk.text, "updated");
    }

    #[test]
    fn upsert_with_other_model_is_rejected() {
        let index = VectorIndex::new();
        index
            .rebuild("model-a", vec![entry("a.pdf", 0, &[1.0, 0.0])])
            .unwrap();
        let err = index
            .upsert("model-b", vec![entry("b.pdf", 0, &[0.0, 1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
    }

    #[test]
    fn remove_deletes_all_entries_for_a_path() {
        let index = VectorIndex::new();
        index
            .rebuild(
                "m",
                vec![
                    entry("a.pdf", 0, &[1.0, 0.0]),
                    entry("a.pdf", 1, &[0.0, 1.0]),
                    entry("b.pdf", 0, &[0.5, 0.5]),
                ],
            )
            .unwrap();
        index.remove("a.pdf");
        assert_eq!(index.len(), 1);
        assert!(!index.documents().contains_key("a.pdf"));
        assert!(index.entries_for("a.pdf").is_empty());
    }

    #[test]
    fn in_flight_reader_keeps_its_snapshot_across_a_rebuild() {
        let index = VectorIndex::new();
        index
            .rebuild("m", vec![entry("old.pdf", 0, &[1.0, 0.0])])
            .unwrap();

        // A reader dereferences the snapshot once per call; simulate an
        // in-flight search by holding the Arc while a rebuild publishes.
        let held = index.current();
        index
            .rebuild("m", vec![entry("new.pdf", 0, &[1.0, 0.0])])
            .unwrap();

        assert_eq!(held.entries.len(), 1);
        assert_eq!(held.entries[0].doc.path, "old.pdf");
        let hits = index.search(&[1.0, 0.0], 5, &PathFilter::default()).unwrap();
        assert_eq!(hits[0].path, "new.pdf");
    }
}

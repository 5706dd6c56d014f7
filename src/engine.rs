//! The engine facade shared by the CLI and the HTTP server.
//!
//! Owns the published index, the embedding and generation capabilities, and
//! the rebuild serialization: at most one ingest runs at a time, and a
//! request arriving while one is in flight either queues behind it or is
//! rejected, per configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::answer;
use crate::config::{Config, RebuildPolicy};
use crate::embedding::{Embedder, OllamaEmbedder};
use crate::error::RagError;
use crate::generate::{Generator, OllamaGenerator};
use crate::index::VectorIndex;
use crate::ingest::{run_ingest, IngestScope};
use crate::models::{Answer, IngestReport, QueryParams};
use crate::retrieve::retrieve;

pub struct RagEngine {
    config: Config,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    /// Serializes ingest runs; `search` never takes this.
    rebuild_lock: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl RagEngine {
    /// Build an engine with the configured Ollama backends.
    pub fn new(config: Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(&config.generation)?);
        Ok(Self::with_backends(config, embedder, generator))
    }

    /// Build an engine with injected backends. Used by tests to substitute
    /// deterministic fakes.
    pub fn with_backends(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config,
            index: Arc::new(VectorIndex::new()),
            embedder,
            generator,
            rebuild_lock: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Run an ingest over `scope`, serialized against concurrent requests.
    ///
    /// With the `queue` policy a second request waits for the in-flight run;
    /// with `reject` it fails with [`RagError::RebuildInProgress`].
    pub async fn ingest(&self, scope: IngestScope) -> Result<IngestReport> {
        let _guard = match self.config.ingest.rebuild_policy {
            RebuildPolicy::Queue => self.rebuild_lock.lock().await,
            RebuildPolicy::Reject => self
                .rebuild_lock
                .try_lock()
                .map_err(|_| RagError::RebuildInProgress)?,
        };

        self.cancel.store(false, Ordering::SeqCst);
        run_ingest(
            &self.config,
            &self.index,
            &self.embedder,
            scope,
            &self.cancel,
        )
        .await
    }

    /// Request cancellation of the in-flight ingest. The document being
    /// processed finishes; unstarted documents are reported as skipped.
    pub fn cancel_ingest(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Answer a question: retrieve context, then orchestrate generation.
    pub async fn ask(&self, params: &QueryParams) -> Result<Answer, RagError> {
        let retrieved = retrieve(
            &self.config.retrieval,
            &self.index,
            self.embedder.as_ref(),
            params,
        )
        .await?;
        answer::answer(&self.config, self.generator.as_ref(), params, retrieved).await
    }

    /// Whether the index has published a snapshot and can serve searches.
    pub fn is_ready(&self) -> bool {
        self.index.is_ready()
    }
}

//! # Ragdex
//!
//! Retrieval-augmented question answering over a locally stored document
//! corpus. Documents are extracted, chunked, and embedded into an
//! in-process vector index; questions are answered by ranking chunks
//! against the query embedding and handing the best ones to a generation
//! backend, with per-source confidence scores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│  Ingestion pipeline   │──▶│ Vector index │
//! │ txt/md/  │   │ extract→chunk→embed  │   │  (snapshot-  │
//! │   pdf    │   │  (bounded workers)   │   │   swapped)   │
//! └──────────┘   └──────────────────────┘   └──────┬───────┘
//!                                                  │
//!                       question ──▶ retrieve ─────┤
//!                                        │         ▼
//!                                        ▼   ranked chunks
//!                                   orchestrate ──▶ answer + sources
//! ```
//!
//! The index is an immutable snapshot behind an atomically swapped
//! reference: searches run concurrently with rebuilds and always observe a
//! complete, consistent corpus state.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`corpus`] | Corpus directory scanning |
//! | [`extract`] | Text extraction with page tracking |
//! | [`chunk`] | Sliding-window chunking with offset tracking |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`generate`] | Generation backend abstraction |
//! | [`index`] | Snapshot-isolated vector index |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`retrieve`] | Retrieval engine |
//! | [`answer`] | Answer orchestration |
//! | [`engine`] | Engine facade shared by CLI and server |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod server;

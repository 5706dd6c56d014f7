//! Corpus directory scanning.
//!
//! Walks the configured corpus root, applies include/exclude globs, and
//! returns the eligible documents with enough metadata to decide whether
//! re-processing is needed.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::extract::ELIGIBLE_EXTENSIONS;
use crate::models::DocumentMeta;

/// A document found during a corpus scan, before extraction.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub abs_path: PathBuf,
    /// Path relative to the corpus root; the document's identity.
    pub rel_path: String,
    /// Lowercase extension, the extraction format hint.
    pub format: String,
}

/// List all eligible documents under the corpus root, sorted by relative
/// path so scan order is deterministic.
pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<ScannedDocument>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !include_set.is_match(rel) || exclude_set.is_match(rel) {
            continue;
        }

        let format = match extension_of(entry.path()) {
            Some(ext) if ELIGIBLE_EXTENSIONS.contains(&ext.as_str()) => ext,
            _ => continue,
        };

        documents.push(ScannedDocument {
            abs_path: entry.path().to_path_buf(),
            rel_path: rel.to_string_lossy().replace('\\', "/"),
            format,
        });
    }

    documents.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(documents)
}

/// Read a scanned document's bytes and compute its metadata snapshot.
/// `page_count` is filled in after extraction.
pub fn load_document(scanned: &ScannedDocument) -> Result<(Vec<u8>, DocumentMeta)> {
    let bytes = std::fs::read(&scanned.abs_path)?;

    let metadata = std::fs::metadata(&scanned.abs_path)?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());

    let meta = DocumentMeta {
        path: scanned.rel_path.clone(),
        content_hash: content_hash(&bytes),
        size: bytes.len() as u64,
        modified,
        page_count: 0,
    };

    Ok((bytes, meta))
}

/// SHA-256 of the raw file bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

//! Text extraction for corpus documents.
//!
//! Turns raw document bytes plus a format hint (the file extension) into an
//! ordered sequence of [`Page`]s in reading order. Extraction is a pure
//! transform; per-document failures are isolated by the ingest pipeline.

use crate::error::RagError;
use crate::models::Page;

/// Extensions the pipeline considers eligible for ingestion.
pub const ELIGIBLE_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Extract pages from document bytes. `format` is the lowercase file
/// extension. Plain-text formats yield a single page 1; PDFs yield one page
/// per PDF page. Page text is whitespace-normalized.
///
/// A document with no extractable text yields pages with empty text rather
/// than an error; the pipeline records that as a warning.
pub fn extract_pages(path: &str, bytes: &[u8], format: &str) -> Result<Vec<Page>, RagError> {
    match format {
        "txt" | "md" => {
            let text = String::from_utf8_lossy(bytes);
            Ok(vec![Page {
                number: 1,
                text: sanitize(&text),
            }])
        }
        "pdf" => extract_pdf(path, bytes),
        other => Err(RagError::Extraction {
            path: path.to_string(),
            reason: format!("unsupported format: {}", other),
        }),
    }
}

fn extract_pdf(path: &str, bytes: &[u8]) -> Result<Vec<Page>, RagError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
        RagError::Extraction {
            path: path.to_string(),
            reason: format!("PDF extraction failed: {}", e),
        }
    })?;

    Ok(pages
        .iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: i + 1,
            text: sanitize(text),
        })
        .collect())
}

/// Collapse all whitespace runs to single spaces and trim. Chunk offsets are
/// tracked over this normalized text, so it must be deterministic.
pub fn sanitize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

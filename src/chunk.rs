//! Sliding-window text chunker.
//!
//! Concatenates extracted pages into one normalized text, then slides a
//! window of `chunk_size` characters with `overlap` characters of back-step.
//! Offsets are character offsets into the concatenated text; consecutive
//! chunk ranges overlap by exactly the configured window and cover the text
//! with no gaps. The final chunk may be shorter than `chunk_size`.
//!
//! Chunk IDs are SHA-256 over the document path and offset range, so
//! re-chunking unchanged text produces identical IDs.

use sha2::{Digest, Sha256};

use crate::error::RagError;
use crate::models::{Chunk, Page};

/// Concatenate page texts with single-space separators, recording the
/// starting character offset of each page. Empty pages are skipped.
pub fn concatenate_pages(pages: &[Page]) -> (String, Vec<(usize, usize)>) {
    let mut text = String::new();
    let mut char_len = 0usize;
    let mut page_starts = Vec::new();

    for page in pages {
        if page.text.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
            char_len += 1;
        }
        page_starts.push((char_len, page.number));
        text.push_str(&page.text);
        char_len += page.text.chars().count();
    }

    (text, page_starts)
}

/// Split a document's pages into chunks.
///
/// Fails with a config error unless `overlap < chunk_size`. A document with
/// no extractable text yields zero chunks.
pub fn chunk_document(
    path: &str,
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, RagError> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be > 0".to_string()));
    }
    if overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "overlap ({}) must be strictly less than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    let (text, page_starts) = concatenate_pages(pages);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut seq = 0usize;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(Chunk {
            id: chunk_id(path, start, end),
            seq,
            start,
            end,
            page: page_for_offset(&page_starts, start),
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start = end - overlap;
        seq += 1;
    }

    Ok(chunks)
}

/// Stable chunk identity: SHA-256 over the document path and offset range.
pub fn chunk_id(path: &str, start: usize, end: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(start.to_le_bytes());
    hasher.update(end.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// The 1-based page a character offset falls on.
fn page_for_offset(page_starts: &[(usize, usize)], offset: usize) -> usize {
    let idx = page_starts.partition_point(|(start, _)| *start <= offset);
    if idx == 0 {
        1
    } else {
        page_starts[idx - 1].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: usize, text: &str) -> Page {
        Page {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_document("a.txt", &[page(1, "hello world")], 100, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 11));
    }

    #[test]
    fn windows_overlap_by_exactly_the_configured_amount() {
        let text: String = "abcdefghij".repeat(10); // 100 chars
        let chunks = chunk_document("a.txt", &[page(1, &text)], 40, 10).unwrap();
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 10);
            assert_eq!(pair[1].seq, pair[0].seq + 1);
        }
        assert_eq!(chunks.last().unwrap().end, 100);
    }

    #[test]
    fn chunks_cover_the_text_with_no_gaps() {
        let text: String = ('a'..='z').cycle().take(257).collect();
        let chunks = chunk_document("a.txt", &[page(1, &text)], 50, 12).unwrap();

        // Reconstruct from offset ranges, dropping each chunk's overlap
        // prefix beyond the previous chunk's end.
        let chars: Vec<char> = text.chars().collect();
        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for c in &chunks {
            assert!(c.start <= covered, "gap before chunk {}", c.seq);
            let fresh: String = chars[covered..c.end].iter().collect();
            rebuilt.push_str(&fresh);
            covered = c.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn final_chunk_may_be_short() {
        let text: String = "x".repeat(105);
        let chunks = chunk_document("a.txt", &[page(1, &text)], 50, 10).unwrap();
        let last = chunks.last().unwrap();
        assert!(last.end - last.start < 50);
        assert_eq!(last.end, 105);
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let chunks = chunk_document("a.txt", &[page(1, "")], 50, 10).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn overlap_equal_to_chunk_size_is_a_config_error() {
        let err = chunk_document("a.txt", &[page(1, "text")], 10, 10).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let pages = [page(1, &"word ".repeat(100))];
        let a = chunk_document("docs/a.txt", &pages, 80, 20).unwrap();
        let b = chunk_document("docs/a.txt", &pages, 80, 20).unwrap();
        assert_eq!(
            a.iter().map(|c| &c.id).collect::<Vec<_>>(),
            b.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        // Same ranges under a different path get different IDs.
        let other = chunk_document("docs/b.txt", &pages, 80, 20).unwrap();
        assert_ne!(a[0].id, other[0].id);
    }

    #[test]
    fn page_tracking_follows_concatenation_offsets() {
        let pages = [page(1, &"a".repeat(30)), page(2, &"b".repeat(30))];
        let chunks = chunk_document("a.pdf", &pages, 25, 5).unwrap();
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks.last().unwrap().page, 2);
    }
}

//! # Recursive character splitter
//!
//! Splits extracted text into overlapping chunks of at most `chunk_size`
//! characters. The text is cut on the coarsest separator that occurs in it
//! (paragraph, line, word, then single characters); pieces that are still too
//! long are split again with the next separator. Small pieces are then merged
//! greedily back up to `chunk_size`, carrying up to `chunk_overlap` characters of
//! the previous chunk's tail into the next one.
//!
//! Separators stay attached to the start of the piece that follows them, so
//! every chunk is a verbatim span of the source text.
//!
//! ```
//! use doku::splitter::TextSplitter;
//!
//! let splitter = TextSplitter::new(20, 5).unwrap();
//! let chunks = splitter.split_text("one two three four five six seven eight");
//! assert!(chunks.iter().all(|c| c.chars().count() <= 20));
//! ```

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, ops::Range};

use crate::document::Document;
use crate::error::{DokuError, Result};

/// Separators tried in order, coarsest first. The empty separator splits into
/// single characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A contiguous span of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Name of the document the chunk was cut from.
    pub source: String,
    /// Position of the chunk within its document.
    pub index: usize,
    /// Byte offset of `text` inside the document's extracted text.
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS)
    }

    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[&str],
    ) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(DokuError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than a positive chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: separators.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| text[span].to_string())
            .collect()
    }

    /// Byte ranges of the chunks of `text`, in document order.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.split_recursive(text, 0..text.len(), &self.separators)
    }

    /// Splits a document and records where each chunk sits in its text.
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        self.split_spans(text)
            .into_iter()
            .enumerate()
            .map(|(index, span)| Chunk {
                source: document.filename.clone(),
                index,
                start: span.start,
                text: text[span].to_string(),
            })
            .collect()
    }

    fn split_recursive(
        &self,
        text: &str,
        span: Range<usize>,
        separators: &[String],
    ) -> Vec<Range<usize>> {
        let slice = &text[span.clone()];
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if slice.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut final_spans = Vec::new();
        let mut small: Vec<(Range<usize>, usize)> = Vec::new();
        for piece in split_keeping_separator(slice, separator) {
            let piece = span.start + piece.start..span.start + piece.end;
            let len = char_len(&text[piece.clone()]);
            if len < self.chunk_size {
                small.push((piece, len));
                continue;
            }
            if !small.is_empty() {
                final_spans.extend(self.merge_pieces(text, &small));
                small.clear();
            }
            if remaining.is_empty() {
                final_spans.extend(trim_span(text, piece));
            } else {
                final_spans.extend(self.split_recursive(text, piece, remaining));
            }
        }
        if !small.is_empty() {
            final_spans.extend(self.merge_pieces(text, &small));
        }

        final_spans
    }

    /// Merges adjacent pieces (with their char lengths) into windows of at
    /// most `chunk_size` characters.
    fn merge_pieces(&self, text: &str, pieces: &[(Range<usize>, usize)]) -> Vec<Range<usize>> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for (piece, len) in pieces.iter().cloned() {
            if total + len > self.chunk_size && !window.is_empty() {
                merged.extend(window_span(text, &window));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        merged.extend(window_span(text, &window));

        merged
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The trimmed span covered by a window of contiguous pieces.
fn window_span(text: &str, window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let start = window.front()?.0.start;
    let end = window.back()?.0.end;
    trim_span(text, start..end)
}

fn trim_span(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[span.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = span.start + (slice.len() - slice.trim_start().len());
    Some(start..start + trimmed.len())
}

/// Byte ranges of `text` cut before every occurrence of `separator`.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| i..i + c.len_utf8())
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(last..idx);
            last = idx;
        }
    }
    if last < text.len() {
        pieces.push(last..text.len());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(text: &str) -> Document {
        Document {
            filename: "doc.txt".to_string(),
            text: text.to_string(),
            digest: String::new(),
        }
    }

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::new(1000, 200).unwrap();
        assert_eq!(
            splitter.split_text("  A short document.  "),
            vec!["A short document."]
        );
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n").is_empty());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(10, 10).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = format!(
            "{}\n\n{}\n{}",
            numbered_words(80),
            numbered_words(5),
            "x".repeat(130)
        );
        let splitter = TextSplitter::new(50, 10).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn test_paragraphs_are_kept_together_when_they_fit() {
        let splitter = TextSplitter::new(40, 5).unwrap();
        let chunks = splitter.split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(
            chunks,
            vec!["First paragraph here.", "Second paragraph here."]
        );
    }

    #[test]
    fn test_neighbouring_chunks_overlap() {
        let doc = document(&numbered_words(60));
        let splitter = TextSplitter::new(50, 20).unwrap();
        let chunks = splitter.split_document(&doc);
        assert!(chunks.len() > 3);
        for pair in chunks.windows(2) {
            let previous_end = pair[0].start + pair[0].text.len();
            assert!(pair[1].start > pair[0].start);
            assert!(
                pair[1].start < previous_end,
                "chunk {} does not overlap chunk {}",
                pair[1].index,
                pair[0].index
            );
        }
    }

    #[test]
    fn test_chunks_reassemble_to_the_document() {
        let text = format!(
            "Übersicht · {}\n\n{}\nEnde.",
            numbered_words(70),
            numbered_words(30)
        );
        let doc = document(&text);
        let splitter = TextSplitter::new(64, 16).unwrap();
        let chunks = splitter.split_document(&doc);

        let mut covered = vec![false; text.len()];
        for chunk in &chunks {
            assert_eq!(chunk.source, "doc.txt");
            let span = &text[chunk.start..chunk.start + chunk.text.len()];
            assert_eq!(span, chunk.text);
            covered[chunk.start..chunk.start + chunk.text.len()]
                .iter_mut()
                .for_each(|c| *c = true);
        }

        for (offset, byte) in text.bytes().enumerate() {
            if !byte.is_ascii_whitespace() {
                assert!(covered[offset], "byte {offset} not covered by any chunk");
            }
        }

        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキスト".repeat(20);
        let splitter = TextSplitter::new(15, 3).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 5);
        assert!(chunks.iter().all(|c| c.chars().count() <= 15));
    }

    #[test]
    fn test_repeated_text_offsets_follow_document_order() {
        let text = "abc ".repeat(100);
        let doc = document(&text);
        let splitter = TextSplitter::new(20, 5).unwrap();
        let chunks = splitter.split_document(&doc);

        let mut covered = vec![false; text.len()];
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
        for chunk in &chunks {
            assert_eq!(&text[chunk.start..chunk.start + chunk.text.len()], chunk.text);
            covered[chunk.start..chunk.start + chunk.text.len()]
                .iter_mut()
                .for_each(|c| *c = true);
        }
        let uncovered = text
            .bytes()
            .zip(&covered)
            .filter(|(byte, covered)| !byte.is_ascii_whitespace() && !**covered)
            .count();
        assert_eq!(uncovered, 0);
        let last = chunks.last().unwrap();
        assert_eq!(last.start + last.text.len(), text.trim_end().len());
    }
}

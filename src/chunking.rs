//! Recursive-separator text splitting.
//!
//! Long documents are cut into overlapping spans along the coarsest boundary
//! available: paragraph breaks first, then line breaks, sentence terminators,
//! word boundaries, and finally single characters. Every produced chunk is a
//! contiguous span of the original text and consecutive chunks from the same
//! document share exactly `chunk_overlap` characters, which makes the split
//! lossless and reproducible: stripping the overlapping prefix from each
//! follow-up chunk and concatenating reconstructs the document verbatim.
//!
//! Lengths and offsets are measured in characters, not bytes; spans never cut
//! a code point in half.

use serde_json::{Map, Value};

use crate::loader::Document;
use crate::types::RagError;

/// Separator tiers from coarsest to finest. The trailing empty string is the
/// character-level fallback that always yields an in-range boundary.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A contiguous span of a source document.
#[derive(Clone, Debug, PartialEq)]
pub struct TextSpan {
    /// Character offset of the span within the original text.
    pub offset: usize,
    pub content: String,
}

/// The atomic unit stored in the vector index.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Label of the parent document's corpus (file path or caller-supplied).
    pub source: String,
    /// Position of the parent document within the ingestion run.
    pub doc_index: usize,
    /// Position of this chunk within the parent document.
    pub chunk_index: usize,
    /// Character offset of this chunk within the parent document.
    pub offset: usize,
    /// Parent document metadata plus `chunk_index`.
    pub metadata: Map<String, Value>,
}

/// Splits documents into bounded overlapping chunks.
#[derive(Clone, Debug)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Creates a splitter with the default separator tiers.
    ///
    /// Fails with [`RagError::Configuration`] when `chunk_size` is zero or
    /// `chunk_overlap` does not stay below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        Self::with_separators(
            chunk_size,
            chunk_overlap,
            DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Creates a splitter with caller-supplied separator tiers
    /// (coarsest first; an empty string enables character-level splitting).
    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: Vec<String>,
    ) -> Result<Self, RagError> {
        if chunk_size < 1 {
            return Err(RagError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits raw text into spans.
    ///
    /// Each span ends at the latest boundary of the coarsest separator tier
    /// that lands inside the window `(start + overlap, start + size]`; finer
    /// tiers are consulted only when a tier has no boundary in range. The
    /// next span starts exactly `chunk_overlap` characters before the
    /// previous span's end. A fragment with no usable boundary at any tier is
    /// emitted whole rather than truncated, so no content is ever lost.
    pub fn split_text(&self, text: &str) -> Vec<TextSpan> {
        // boundaries[i] is the byte offset of character i; the sentinel at
        // the end makes boundaries[total] the byte length.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
        boundaries.push(text.len());
        let total = boundaries.len() - 1;
        if total == 0 {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut start = 0usize;
        loop {
            if total - start <= self.chunk_size {
                spans.push(span_of(text, &boundaries, start, total));
                break;
            }
            let end = self.chunk_end(text, &boundaries, start, total);
            spans.push(span_of(text, &boundaries, start, end));
            if end >= total {
                break;
            }
            start = end - self.chunk_overlap;
        }
        spans
    }

    /// Splits documents in order, preserving chunk order within each document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (doc_index, document) in documents.iter().enumerate() {
            let source = source_label(document, doc_index);
            for (chunk_index, span) in self.split_text(&document.content).into_iter().enumerate() {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), Value::from(chunk_index));
                chunks.push(Chunk {
                    content: span.content,
                    source: source.clone(),
                    doc_index,
                    chunk_index,
                    offset: span.offset,
                    metadata,
                });
            }
        }
        chunks
    }

    /// Picks the end (in characters) of the chunk starting at `start`.
    fn chunk_end(&self, text: &str, boundaries: &[usize], start: usize, total: usize) -> usize {
        let limit = start + self.chunk_size;
        let floor = start + self.chunk_overlap;

        for separator in &self.separators {
            if separator.is_empty() {
                return limit;
            }
            let window = &text[boundaries[start]..boundaries[limit]];
            let mut best = None;
            for (at, _) in window.match_indices(separator.as_str()) {
                let end_byte = boundaries[start] + at + separator.len();
                let end = boundaries.partition_point(|&byte| byte < end_byte);
                if end > floor {
                    best = Some(end);
                }
            }
            if let Some(end) = best {
                return end;
            }
        }

        // No tier produced a boundary inside the window: the fragment is
        // indivisible at this size. Emit it whole, up to the first boundary
        // past the window (or the end of the text).
        let tail = &text[boundaries[start]..];
        let mut end = total;
        for separator in &self.separators {
            for (at, _) in tail.match_indices(separator.as_str()) {
                let end_byte = boundaries[start] + at + separator.len();
                let candidate = boundaries.partition_point(|&byte| byte < end_byte);
                if candidate > floor {
                    end = end.min(candidate);
                    break;
                }
            }
        }
        end
    }
}

fn span_of(text: &str, boundaries: &[usize], start: usize, end: usize) -> TextSpan {
    TextSpan {
        offset: start,
        content: text[boundaries[start]..boundaries[end]].to_string(),
    }
}

fn source_label(document: &Document, doc_index: usize) -> String {
    if let Some(Value::String(source)) = document.metadata.get("source") {
        return source.clone();
    }
    if let Some(id) = &document.source_id {
        return id.clone();
    }
    format!("doc-{doc_index}")
}

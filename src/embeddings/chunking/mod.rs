
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::documents::Document;

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    /// Sequential identifier, unique across one indexing run
    pub id: String,
    /// The chunk text
    pub content: String,
    /// File the chunk was cut from
    pub source_path: String,
    /// 1-based page number, for paginated sources
    pub page: Option<u32>,
}

/// Configuration for recursive character chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
    /// Split points in order of preference. An empty string splits between characters.
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 60,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                String::new(),
            ],
        }
    }
}

/// Chunk every document, numbering chunks sequentially across the whole set
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();

    for document in documents {
        for content in split_text(&document.text, config) {
            chunks.push(ContentChunk {
                id: chunks.len().to_string(),
                content,
                source_path: document.source_path.clone(),
                page: document.page,
            });
        }
    }

    debug!(
        "Chunked {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );

    chunks
}

/// Split text into overlapping windows of at most `chunk_size` characters.
///
/// The highest-priority separator present in the text is used first. Pieces that are still
/// too long are split again with the remaining separators; the empty separator cuts at
/// character boundaries.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_recursive(text, &config.separators, config)
}

fn split_recursive(text: &str, separators: &[String], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();

    let (separator, remaining) = pick_separator(text, separators);
    let pieces = split_on(text, separator);

    let mut small_pieces: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) < config.chunk_size {
            small_pieces.push(piece);
            continue;
        }

        if !small_pieces.is_empty() {
            chunks.extend(merge_pieces(&small_pieces, separator, config));
            small_pieces.clear();
        }

        if remaining.is_empty() {
            // Nothing left to split on; keep the oversized piece whole
            warn!(
                "Piece of {} characters exceeds chunk size {} and cannot be split further",
                char_len(piece),
                config.chunk_size
            );
            chunks.push(piece.trim().to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !small_pieces.is_empty() {
        chunks.extend(merge_pieces(&small_pieces, separator, config));
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Pick the first separator that occurs in `text`, returning it with the lower-priority rest
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[i + 1..]);
        }
    }

    // No listed separator matched and none was the empty one
    (
        separators.last().map_or("", String::as_str),
        &separators[separators.len()..],
    )
}

fn split_on<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        text.split_inclusive(|_: char| true).collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .collect()
    }
}

/// Greedily join pieces into windows, carrying trailing pieces forward as overlap
fn merge_pieces(pieces: &[&str], separator: &str, config: &ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut merged = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0;

    for &piece in pieces {
        let piece_len = char_len(piece);
        let joiner = if window.is_empty() { 0 } else { separator_len };

        if total + piece_len + joiner > config.chunk_size && !window.is_empty() {
            push_window(&mut merged, &window, separator);

            // Shrink the window until it fits the overlap budget and leaves room for `piece`
            while total > config.chunk_overlap
                || (total > 0
                    && total + piece_len + if window.is_empty() { 0 } else { separator_len }
                        > config.chunk_size)
            {
                let removed = window.remove(0);
                total -= char_len(removed) + if window.is_empty() { 0 } else { separator_len };
            }
        }

        let joiner = if window.is_empty() { 0 } else { separator_len };
        window.push(piece);
        total += piece_len + joiner;
    }

    push_window(&mut merged, &window, separator);
    merged
}

fn push_window(merged: &mut Vec<String>, window: &[&str], separator: &str) {
    let joined = window.join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        merged.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

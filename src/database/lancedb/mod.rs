// LanceDB vector database module
// Chunk collections and cosine similarity search


pub mod vector_store;

pub use vector_store::{Collection, VectorStore};

use serde::{Deserialize, Serialize};

use crate::embeddings::ContentChunk;

/// Chunk row stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier within the collection
    pub id: String,
    /// The chunk embedding
    pub vector: Vec<f32>,
    /// The chunk text
    pub text: String,
    /// Source file the chunk came from
    pub source_path: String,
    /// 1-based page number for paginated sources
    pub page: Option<u32>,
}

impl ChunkRecord {
    #[inline]
    pub fn from_chunk(chunk: ContentChunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            vector,
            text: chunk.content,
            source_path: chunk.source_path,
            page: chunk.page,
        }
    }
}

/// A chunk returned from a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub source_path: String,
    pub page: Option<u32>,
    /// Cosine distance to the query, lower is closer
    pub distance: f32,
}

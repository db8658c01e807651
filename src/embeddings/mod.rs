// Embeddings module
// Text chunking and the embedding model seam

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, ContentChunk, chunk_documents, split_text};
pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given model, and embedding a batch must give
/// the same vectors as embedding each text on its own.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

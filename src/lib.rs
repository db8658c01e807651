use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collection '{0}' not found. Run `pdf-rag-chat index` to build it first")]
    CollectionNotFound(String),

    #[error("Duplicate chunk id '{0}' in collection")]
    DuplicateChunkId(String),

    #[error("Embedding dimension mismatch: collection stores {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Query service unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod client;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod indexer;
pub mod retrieval;
pub mod server;
pub mod sessions;

#[cfg(test)]
pub(crate) mod test_support;

// Database module
// SQLite for the collection manifest and chat sessions, LanceDB for chunk vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkRecord, Collection, ScoredChunk, VectorStore};
pub use sqlite::Database;

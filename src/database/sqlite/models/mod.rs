#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a vector collection was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CollectionManifest {
    pub name: String,
    pub model: String,
    pub dimension: i64,
    pub chunk_count: i64,
    pub document_count: i64,
    pub created_at: NaiveDateTime,
}

impl CollectionManifest {
    /// Whether vectors in this collection came from `model`
    #[inline]
    pub fn built_with(&self, model: &str) -> bool {
        self.model == model
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCollectionManifest {
    pub name: String,
    pub model: String,
    pub dimension: i64,
    pub chunk_count: i64,
    pub document_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SessionSummary {
    pub id: String,
    pub turn_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TurnRecord {
    pub session_id: String,
    pub turn_index: i64,
    pub question: String,
    pub answer: String,
    pub created_at: NaiveDateTime,
}

// Retrieval service
// Answers questions with the closest stored chunk and records the exchange

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::{Collection, Database, ScoredChunk};
use crate::embeddings::Embedder;
use crate::sessions::{SessionStore, Turn};
use crate::{RagError, Result};

pub const EMPTY_QUESTION_ANSWER: &str = "Please provide a question.";
pub const NO_MATCH_ANSWER: &str = "No matching document found";

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Text of the nearest chunk
    Retrieved,
    /// The question was blank; nothing was recorded
    EmptyQuery,
    /// The collection held nothing to match
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub history: Vec<Turn>,
    #[serde(skip)]
    pub kind: AnswerKind,
}

/// Question answering over one collection, shared by every request
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    collection: Collection,
    sessions: Arc<dyn SessionStore>,
    top_k: usize,
}

impl std::fmt::Debug for RetrievalService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("model", &self.embedder.model_name())
            .field("collection", &self.collection)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl RetrievalService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        collection: Collection,
        sessions: Arc<dyn SessionStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            collection,
            sessions,
            top_k: top_k.max(1),
        }
    }

    /// Warn when the collection was built with a different embedding model
    #[inline]
    pub async fn check_manifest(&self, database: &Database) -> Result<()> {
        let manifest = database
            .get_collection(self.collection.name())
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        match manifest {
            Some(manifest) if !manifest.built_with(self.embedder.model_name()) => {
                warn!(
                    "Collection '{}' was built with model '{}' but '{}' is configured; results may be meaningless",
                    manifest.name,
                    manifest.model,
                    self.embedder.model_name()
                );
            }
            Some(manifest) => {
                info!(
                    "Serving collection '{}' ({} chunks, model {})",
                    manifest.name, manifest.chunk_count, manifest.model
                );
            }
            None => {
                warn!(
                    "No manifest recorded for collection '{}'",
                    self.collection.name()
                );
            }
        }

        Ok(())
    }

    #[inline]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    #[inline]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` within `session_id` and return the updated history.
    ///
    /// A blank question is answered with a prompt and leaves the session untouched.
    #[inline]
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<AskResponse> {
        if session_id.trim().is_empty() {
            return Err(RagError::Validation(
                "session_id must not be empty".to_string(),
            ));
        }

        let question = question.trim();
        if question.is_empty() {
            debug!("Empty question for session {}", session_id);
            return Ok(AskResponse {
                answer: EMPTY_QUESTION_ANSWER.to_string(),
                history: self.sessions.get(session_id).await?,
                kind: AnswerKind::EmptyQuery,
            });
        }

        let results = self.search(question, self.top_k).await?;

        let (answer, kind) = match results.into_iter().next() {
            Some(best) => {
                debug!(
                    "Best match {} from {} (distance {:.4})",
                    best.id, best.source_path, best.distance
                );
                (best.text, AnswerKind::Retrieved)
            }
            None => (NO_MATCH_ANSWER.to_string(), AnswerKind::NoMatch),
        };

        let history = self
            .sessions
            .append(session_id, Turn::new(question, answer.clone()))
            .await?;

        Ok(AskResponse {
            answer,
            history,
            kind,
        })
    }

    /// The `k` chunks nearest to `question`, nearest first
    #[inline]
    pub async fn search(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embed_query(question).await?;
        self.collection.query(&embedding, k).await
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();

        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
    }
}

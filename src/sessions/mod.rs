// Chat session storage
// In-memory and SQLite-backed conversation histories


use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::database::Database;
use crate::{RagError, Result};

const MAX_SESSION_ID_CHARS: usize = 50;
pub const DEFAULT_SESSION_ID: &str = "chat_default";

static SESSION_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("regex is valid"));

/// One question and the answer given to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    #[inline]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Storage for independent, append-only conversation histories.
///
/// Appends to one session are serialized; sessions share no mutable state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Turns recorded for `id`, empty when the session does not exist
    async fn get(&self, id: &str) -> Result<Vec<Turn>>;

    /// Append a turn, creating the session if needed, and return the full history
    async fn append(&self, id: &str, turn: Turn) -> Result<Vec<Turn>>;

    /// Remove a session, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Known session ids
    async fn list(&self) -> Result<Vec<String>>;
}

/// Map free text onto a session id safe for storage keys and file names
#[inline]
pub fn sanitize_session_id(raw: &str) -> String {
    let replaced = SESSION_ID_REGEX.replace_all(raw.trim(), "_");
    let truncated: String = replaced.chars().take(MAX_SESSION_ID_CHARS).collect();

    if truncated.is_empty() {
        DEFAULT_SESSION_ID.to_string()
    } else {
        truncated
    }
}

/// Render turns as a plain-text transcript
#[inline]
pub fn format_transcript(turns: &[Turn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        let _ = write!(transcript, "You: {}\nBot: {}\n\n", turn.question, turn.answer);
    }
    transcript
}

/// Per-session locks so appends to one id never interleave.
///
/// Entries exist only while an append for that id is in flight.
#[derive(Debug, Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    /// Drop the entry for `id` once no other append holds or awaits `lock`
    async fn release(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let is_current = locks.get(id).is_some_and(|held| Arc::ptr_eq(held, &lock));
        // One reference lives in the map, the other is ours
        if is_current && Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    async fn forget(&self, id: &str) {
        self.locks.lock().await.remove(id);
    }
}

/// Session store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Vec<Turn>>>>>,
}

impl MemorySessionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, id: &str) -> Arc<Mutex<Vec<Turn>>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.to_string()).or_default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    #[inline]
    async fn get(&self, id: &str) -> Result<Vec<Turn>> {
        let session = self.sessions.read().await.get(id).map(Arc::clone);
        match session {
            Some(turns) => Ok(turns.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    #[inline]
    async fn append(&self, id: &str, turn: Turn) -> Result<Vec<Turn>> {
        let session = self.session(id).await;
        let mut turns = session.lock().await;
        turns.push(turn);
        debug!("Session {} now has {} turns", id, turns.len());
        Ok(turns.clone())
    }

    #[inline]
    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    #[inline]
    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Durable session store backed by the metadata database.
///
/// Sessions are keyed by their sanitized id.
#[derive(Debug)]
pub struct SqliteSessionStore {
    database: Database,
    locks: SessionLocks,
}

impl SqliteSessionStore {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self {
            database,
            locks: SessionLocks::default(),
        }
    }
}

fn database_error(error: &anyhow::Error) -> RagError {
    RagError::Database(format!("{:#}", error))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[inline]
    async fn get(&self, id: &str) -> Result<Vec<Turn>> {
        let key = sanitize_session_id(id);
        let records = self
            .database
            .get_turns(&key)
            .await
            .map_err(|e| database_error(&e))?;

        Ok(records
            .into_iter()
            .map(|record| Turn::new(record.question, record.answer))
            .collect())
    }

    #[inline]
    async fn append(&self, id: &str, turn: Turn) -> Result<Vec<Turn>> {
        let key = sanitize_session_id(id);
        let lock = self.locks.lock_for(&key).await;

        let history = async {
            let _guard = lock.lock().await;
            self.database
                .append_turn(&key, &turn.question, &turn.answer)
                .await
                .map_err(|e| database_error(&e))?;
            self.get(&key).await
        }
        .await;

        self.locks.release(&key, lock).await;
        history
    }

    #[inline]
    async fn delete(&self, id: &str) -> Result<bool> {
        let key = sanitize_session_id(id);
        let deleted = self
            .database
            .delete_session(&key)
            .await
            .map_err(|e| database_error(&e))?;
        self.locks.forget(&key).await;
        Ok(deleted)
    }

    #[inline]
    async fn list(&self) -> Result<Vec<String>> {
        let sessions = self
            .database
            .list_sessions()
            .await
            .map_err(|e| database_error(&e))?;

        Ok(sessions.into_iter().map(|session| session.id).collect())
    }
}

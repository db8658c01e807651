
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct CollectionQueries;

impl CollectionQueries {
    /// Record how a collection was built, replacing any previous manifest
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        manifest: NewCollectionManifest,
    ) -> Result<CollectionManifest> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO collections (name, model, dimension, chunk_count, document_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                model = excluded.model,
                dimension = excluded.dimension,
                chunk_count = excluded.chunk_count,
                document_count = excluded.document_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(&manifest.name)
        .bind(&manifest.model)
        .bind(manifest.dimension)
        .bind(manifest.chunk_count)
        .bind(manifest.document_count)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record collection manifest")?;

        Self::get(pool, &manifest.name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve collection manifest"))
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, name: &str) -> Result<Option<CollectionManifest>> {
        let result = sqlx::query_as::<_, CollectionManifest>(
            r#"
            SELECT name, model, dimension, chunk_count, document_count, created_at
            FROM collections WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get collection manifest")?;

        Ok(result)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await
            .context("Failed to delete collection manifest")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct SessionQueries;

impl SessionQueries {
    /// Append a turn, creating the session on first use.
    ///
    /// Runs in one transaction, so the turn is either fully recorded or not at all.
    #[inline]
    pub async fn append_turn(
        pool: &SqlitePool,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<i64> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, created_at, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert session")?;

        let turn_index: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO turns (session_id, turn_index, question, answer, created_at)
            SELECT ?, COALESCE(MAX(turn_index) + 1, 0), ?, ?, ?
            FROM turns WHERE session_id = ?
            RETURNING turn_index
            "#,
        )
        .bind(session_id)
        .bind(question)
        .bind(answer)
        .bind(now)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to append turn")?;

        tx.commit().await.context("Failed to commit turn")?;

        debug!("Appended turn {} to session {}", turn_index, session_id);
        Ok(turn_index)
    }

    #[inline]
    pub async fn list_turns(pool: &SqlitePool, session_id: &str) -> Result<Vec<TurnRecord>> {
        let turns = sqlx::query_as::<_, TurnRecord>(
            r#"
            SELECT session_id, turn_index, question, answer, created_at
            FROM turns WHERE session_id = ?
            ORDER BY turn_index
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
        .context("Failed to list turns")?;

        Ok(turns)
    }

    /// Delete a session and its turns
    #[inline]
    pub async fn delete(pool: &SqlitePool, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(pool)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected() > 0)
    }

    /// All sessions, most recently updated first
    #[inline]
    pub async fn list(pool: &SqlitePool) -> Result<Vec<SessionSummary>> {
        let sessions = sqlx::query_as::<_, SessionSummary>(
            r#"
            SELECT s.id, COUNT(t.id) AS turn_count, s.created_at, s.updated_at
            FROM sessions s
            LEFT JOIN turns t ON t.session_id = s.id
            GROUP BY s.id
            ORDER BY s.updated_at DESC, s.id
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list sessions")?;

        Ok(sessions)
    }
}

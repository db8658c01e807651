use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    CollectionManifest, NewCollectionManifest, SessionSummary, TurnRecord,
};
use crate::database::sqlite::queries::{CollectionQueries, SessionQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    // Collection manifest operations
    #[inline]
    pub async fn record_collection(
        &self,
        manifest: NewCollectionManifest,
    ) -> Result<CollectionManifest> {
        CollectionQueries::upsert(&self.pool, manifest).await
    }

    #[inline]
    pub async fn get_collection(&self, name: &str) -> Result<Option<CollectionManifest>> {
        CollectionQueries::get(&self.pool, name).await
    }

    #[inline]
    pub async fn forget_collection(&self, name: &str) -> Result<bool> {
        CollectionQueries::delete(&self.pool, name).await
    }

    // Session operations
    #[inline]
    pub async fn append_turn(&self, session_id: &str, question: &str, answer: &str) -> Result<i64> {
        SessionQueries::append_turn(&self.pool, session_id, question, answer).await
    }

    #[inline]
    pub async fn get_turns(&self, session_id: &str) -> Result<Vec<TurnRecord>> {
        SessionQueries::list_turns(&self.pool, session_id).await
    }

    #[inline]
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        SessionQueries::delete(&self.pool, session_id).await
    }

    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        SessionQueries::list(&self.pool).await
    }
}

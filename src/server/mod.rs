// Query server
// HTTP front end over the retrieval service

pub mod errors;
pub mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::retrieval::RetrievalService;
use crate::sessions::{SessionStore, SqliteSessionStore};
use crate::{RagError, Result};

pub use errors::ApiError;

/// State shared by every request
#[derive(Debug)]
pub struct AppState {
    pub service: RetrievalService,
}

impl AppState {
    #[inline]
    pub fn new(service: RetrievalService) -> Self {
        Self { service }
    }

    /// Connect every backing service named in `config`.
    ///
    /// Fails when the embedding model is unreachable or the collection has not been built.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let ollama = config.ollama.clone();
        let client = tokio::task::spawn_blocking(move || OllamaClient::connect(&ollama))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding client task failed: {}", e)))??;
        let embedder: Arc<dyn Embedder> = Arc::new(client);

        let store = VectorStore::connect(&config.vector_database_path()).await?;
        let collection = store.open_collection(&config.index.collection_name).await?;

        let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(database.clone()));
        let service = RetrievalService::new(embedder, collection, sessions, config.index.top_k);
        service.check_manifest(&database).await?;

        Ok(Self::new(service))
    }
}

/// Routes for the query API
#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route("/ask", post(handlers::ask))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:session_id/transcript", get(handlers::transcript))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the query API until interrupted
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config).await?);

    let bind_addr = config.server.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Query server listening on http://{}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Query server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::chat::run_chat;
use crate::client::{BackendClient, BackendStatus, BackendSupervisor};
use crate::config::Config;
use crate::database::{Database, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::indexer::Indexer;
use crate::retrieval::RetrievalService;
use crate::server;
use crate::sessions::{MemorySessionStore, SessionStore, SqliteSessionStore, format_transcript};

const PREVIEW_CHARS: usize = 200;

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize metadata database")
}

async fn connect_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let ollama = config.ollama.clone();
    let client = tokio::task::spawn_blocking(move || OllamaClient::connect(&ollama))
        .await
        .context("Embedding client task failed")??;
    Ok(Arc::new(client))
}

/// Rebuild the vector collection from the documents in `dir` (or the configured data directory)
#[inline]
pub async fn index_documents(dir: Option<PathBuf>) -> Result<()> {
    let config = Config::load_default()?;
    let data_dir = dir.unwrap_or_else(|| config.index.data_dir.clone());

    let embedder = connect_embedder(&config).await?;
    let store = VectorStore::connect(&config.vector_database_path()).await?;
    let database = open_database(&config).await?;

    let indexer = Indexer::new(embedder, store, database, &config);
    let stats = indexer
        .rebuild(&data_dir)
        .await
        .with_context(|| format!("Failed to index {}", data_dir.display()))?;

    println!(
        "{}",
        style(format!("✓ Collection '{}' rebuilt", config.index.collection_name))
            .green()
            .bold()
    );
    println!("  Files loaded: {}", stats.files_loaded);
    if stats.files_skipped > 0 {
        println!("  Files skipped: {}", style(stats.files_skipped).yellow());
    }
    println!("  Pages/documents: {}", stats.documents_loaded);
    println!("  Chunks stored: {}", stats.chunks_created);
    println!("  Embedding dimension: {}", stats.dimension);
    println!("  Duration: {:.1?}", stats.duration);

    Ok(())
}

/// Run the query server in the foreground
#[inline]
pub async fn serve_api() -> Result<()> {
    let config = Config::load_default()?;
    server::serve(&config).await?;
    Ok(())
}

/// Print the nearest chunks for a single question without touching any session
#[inline]
pub async fn query_documents(question: String, top_k: Option<usize>) -> Result<()> {
    let config = Config::load_default()?;
    let top_k = top_k.unwrap_or(config.index.top_k);

    let embedder = connect_embedder(&config).await?;
    let store = VectorStore::connect(&config.vector_database_path()).await?;
    let collection = store.open_collection(&config.index.collection_name).await?;

    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let service = RetrievalService::new(embedder, collection, sessions, top_k);
    let results = service.search(question.trim(), top_k).await?;

    if results.is_empty() {
        println!("No matching document found");
        return Ok(());
    }

    println!("Top {} results for: {}", results.len(), style(&question).cyan());
    println!();

    for (rank, chunk) in results.iter().enumerate() {
        let location = match chunk.page {
            Some(page) => format!("{} (page {})", chunk.source_path, page),
            None => chunk.source_path.clone(),
        };
        println!(
            "{}. {} {}",
            rank + 1,
            style(location).bold(),
            style(format!("distance {:.4}", chunk.distance)).dim()
        );

        let preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if chunk.text.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        println!("   {}{}", preview.replace('\n', " "), ellipsis);
        println!();
    }

    Ok(())
}

/// Interactive chat, starting the query server first if it is not running
#[inline]
pub async fn start_chat(session: Option<String>) -> Result<()> {
    let config = Config::load_default()?;
    std::fs::create_dir_all(config.get_base_dir()).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.get_base_dir().display()
        )
    })?;

    let client = BackendClient::from_config(&config.server)?;
    let supervisor = BackendSupervisor::for_current_exe(&config.server)?
        .with_log_file(config.get_base_dir().join("server.log"));

    let status = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || supervisor.ensure_running(&client))
            .await
            .context("Server supervision task failed")??
    };

    tokio::task::spawn_blocking(move || run_chat(&client, session))
        .await
        .context("Chat task failed")??;

    if let BackendStatus::Started(mut child) = status {
        info!("Stopping query server started for this chat");
        if let Err(e) = child.kill() {
            warn!("Failed to stop query server: {}", e);
        }
        let _ = child.wait();
    }

    Ok(())
}

/// List stored chat sessions with their turn counts
#[inline]
pub async fn list_sessions() -> Result<()> {
    let config = Config::load_default()?;
    let database = open_database(&config).await?;
    let sessions = database.list_sessions().await?;

    if sessions.is_empty() {
        println!("No chat sessions have been saved yet.");
        println!("Use 'pdf-rag-chat chat' to start one.");
        return Ok(());
    }

    println!("Chat Sessions ({} total):", sessions.len());
    println!();
    for session in &sessions {
        println!("💬 {}", style(&session.id).bold());
        println!("   Turns: {}", session.turn_count);
        println!(
            "   Last Updated: {}",
            session.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Print the history of one session
#[inline]
pub async fn show_session(session_id: String) -> Result<()> {
    let config = Config::load_default()?;
    let store = SqliteSessionStore::new(open_database(&config).await?);
    let turns = store.get(&session_id).await?;

    if turns.is_empty() {
        println!("Session '{}' has no messages.", session_id);
        return Ok(());
    }

    for turn in &turns {
        println!("{} {}", style("You:").bold().cyan(), turn.question);
        println!("{} {}", style("Bot:").bold().green(), turn.answer);
        println!();
    }

    Ok(())
}

#[inline]
pub async fn delete_session(session_id: String) -> Result<()> {
    let config = Config::load_default()?;
    let store = SqliteSessionStore::new(open_database(&config).await?);

    if store.delete(&session_id).await? {
        println!("Deleted session: {}", session_id);
    } else {
        println!("Session not found: {}", session_id);
    }

    Ok(())
}

/// Write a session transcript to `output`, defaulting to `chat_<id>.txt`
#[inline]
pub async fn export_session(session_id: String, output: Option<PathBuf>) -> Result<()> {
    let config = Config::load_default()?;
    let store = SqliteSessionStore::new(open_database(&config).await?);
    let turns = store.get(&session_id).await?;

    if turns.is_empty() {
        anyhow::bail!("Session '{}' has no messages to export", session_id);
    }

    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "chat_{}.txt",
            crate::sessions::sanitize_session_id(&session_id)
        ))
    });
    std::fs::write(&path, format_transcript(&turns))
        .with_context(|| format!("Failed to write transcript to {}", path.display()))?;

    println!(
        "Exported {} turns to {}",
        turns.len(),
        style(path.display()).cyan()
    );
    Ok(())
}

// Indexer module
// Rebuilds a vector collection from a directory of documents


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::sqlite::models::NewCollectionManifest;
use crate::database::{ChunkRecord, Database, VectorStore};
use crate::documents::{LoadReport, load_documents};
use crate::embeddings::{ChunkingConfig, ContentChunk, Embedder, chunk_documents};
use crate::{RagError, Result};

/// Rows written to the vector store per insert
const INSERT_BATCH_SIZE: usize = 1000;

/// Statistics from one rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingStats {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub dimension: usize,
    pub duration: Duration,
}

/// Offline pipeline: load, chunk, embed, then replace the collection
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    database: Database,
    chunking: ChunkingConfig,
    collection_name: String,
    extensions: Vec<String>,
    batch_size: usize,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        database: Database,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            store,
            database,
            chunking: config.chunking.clone(),
            collection_name: config.index.collection_name.clone(),
            extensions: config.index.extensions.clone(),
            batch_size: config.ollama.batch_size.max(1) as usize,
        }
    }

    /// Rebuild the collection from every matching file in `data_dir`.
    ///
    /// Embeddings are computed before the old collection is dropped, so a backend failure
    /// leaves the previous index in place.
    #[inline]
    pub async fn rebuild(&self, data_dir: &Path) -> Result<IndexingStats> {
        let started = Instant::now();
        info!(
            "Rebuilding collection '{}' from {}",
            self.collection_name,
            data_dir.display()
        );

        let report = self.load(data_dir.to_path_buf()).await?;
        if report.files_loaded == 0 {
            warn!("No documents found in {}", data_dir.display());
        }

        let chunks = chunk_documents(&report.documents, &self.chunking);
        info!(
            "Loaded {} documents from {} files into {} chunks",
            report.documents.len(),
            report.files_loaded,
            chunks.len()
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let dimension = match vectors.first() {
            Some(vector) => vector.len(),
            None => self.detect_dimension().await?,
        };

        let collection = self
            .store
            .create_collection(&self.collection_name, dimension)
            .await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
            .collect();

        for group in records.chunks(INSERT_BATCH_SIZE) {
            if let Err(e) = collection.add(group).await {
                self.discard_partial_collection().await;
                return Err(e);
            }
        }

        let chunks_created = collection.count().await?;
        self.database
            .record_collection(NewCollectionManifest {
                name: self.collection_name.clone(),
                model: self.embedder.model_name().to_string(),
                dimension: dimension as i64,
                chunk_count: chunks_created as i64,
                document_count: report.documents.len() as i64,
            })
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let stats = IndexingStats {
            files_loaded: report.files_loaded,
            files_skipped: report.skipped.len(),
            documents_loaded: report.documents.len(),
            chunks_created,
            dimension,
            duration: started.elapsed(),
        };

        info!(
            "Collection '{}' rebuilt with {} chunks in {:?}",
            self.collection_name, stats.chunks_created, stats.duration
        );
        Ok(stats)
    }

    /// Remove a half-written collection and its manifest so nothing serves a truncated index
    async fn discard_partial_collection(&self) {
        warn!(
            "Insert failed, discarding partial collection '{}'",
            self.collection_name
        );
        if let Err(e) = self.store.drop_collection(&self.collection_name).await {
            warn!("Failed to drop partial collection: {}", e);
        }
        if let Err(e) = self.database.forget_collection(&self.collection_name).await {
            warn!("Failed to clear manifest: {:#}", e);
        }
    }

    async fn load(&self, data_dir: PathBuf) -> Result<LoadReport> {
        let extensions = self.extensions.clone();
        tokio::task::spawn_blocking(move || load_documents(&data_dir, &extensions))
            .await
            .map_err(|e| RagError::Document(format!("Document loading task failed: {}", e)))?
    }

    async fn embed_chunks(&self, chunks: &[ContentChunk]) -> Result<Vec<Vec<f32>>> {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for group in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = group.iter().map(|c| c.content.clone()).collect();
            if let Some(first) = group.first() {
                bar.set_message(first.source_path.clone());
            }

            let embedder = Arc::clone(&self.embedder);
            let embedded = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
                .await
                .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))??;

            if embedded.len() != group.len() {
                bar.abandon();
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, received {}",
                    group.len(),
                    embedded.len()
                )));
            }

            debug!("Embedded {} chunks", embedded.len());
            vectors.extend(embedded);
            bar.inc(group.len() as u64);
        }

        bar.finish_and_clear();
        Ok(vectors)
    }

    async fn detect_dimension(&self) -> Result<usize> {
        debug!("No chunks to embed, asking the model for its dimension");
        let embedder = Arc::clone(&self.embedder);
        let vector = tokio::task::spawn_blocking(move || embedder.embed("dimension check"))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))??;
        Ok(vector.len())
    }
}

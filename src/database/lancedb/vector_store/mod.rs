#[cfg(test)]
mod tests;

use super::{ChunkRecord, ScoredChunk};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest number of ids checked in one duplicate lookup filter
const ID_FILTER_CHUNK: usize = 256;

/// Handle to the on-disk LanceDB database holding every collection
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
}

/// An opened collection of chunk vectors
#[derive(Clone)]
pub struct Collection {
    name: String,
    table: Table,
    dimension: usize,
}

impl std::fmt::Debug for Collection {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Open (or create) the vector database at `path`
    #[inline]
    pub async fn connect(path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.display().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        debug!("Vector store connected");
        Ok(Self { connection })
    }

    /// Names of all collections in the database
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
    }

    /// Create an empty collection, replacing any collection with the same name
    #[inline]
    pub async fn create_collection(&self, name: &str, dimension: usize) -> Result<Collection> {
        if dimension == 0 {
            return Err(RagError::Validation(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }

        self.drop_collection(name).await?;

        let table = self
            .connection
            .create_empty_table(name, chunk_schema(dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Created collection '{}' with {} dimensions",
            name, dimension
        );

        Ok(Collection {
            name: name.to_string(),
            table,
            dimension,
        })
    }

    /// Drop a collection; dropping a missing collection is not an error
    #[inline]
    pub async fn drop_collection(&self, name: &str) -> Result<bool> {
        if !self.list_collections().await?.iter().any(|t| t == name) {
            return Ok(false);
        }

        info!("Dropping existing collection '{}'", name);
        self.connection
            .drop_table(name)
            .await
            .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        Ok(true)
    }

    /// Open an existing collection
    #[inline]
    pub async fn open_collection(&self, name: &str) -> Result<Collection> {
        if !self.list_collections().await?.iter().any(|t| t == name) {
            return Err(RagError::CollectionNotFound(name.to_string()));
        }

        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let dimension = detect_vector_dimension(&table).await?;
        debug!("Opened collection '{}' ({} dimensions)", name, dimension);

        Ok(Collection {
            name: name.to_string(),
            table,
            dimension,
        })
    }
}

impl Collection {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Store a batch of chunks.
    ///
    /// The whole batch is rejected when any id repeats within it or is already stored.
    #[inline]
    pub async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No chunks to store");
            return Ok(());
        }

        if let Some(record) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        if let Some(id) = records.iter().map(|r| r.id.as_str()).duplicates().next() {
            return Err(RagError::DuplicateChunkId(id.to_string()));
        }

        self.ensure_ids_absent(records).await?;

        let batch = self.create_record_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;

        debug!(
            "Stored {} chunks in collection '{}'",
            records.len(),
            self.name
        );
        Ok(())
    }

    /// The `k` nearest chunks by cosine distance, nearest first
    #[inline]
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        debug!("Searching '{}' for {} nearest chunks", self.name, k);

        let mut stream = self
            .table
            .vector_search(vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);

        debug!("Query returned {} chunks", results.len());
        Ok(results)
    }

    async fn ensure_ids_absent(&self, records: &[ChunkRecord]) -> Result<()> {
        for group in records.chunks(ID_FILTER_CHUNK) {
            let filter = format!(
                "id IN ({})",
                group
                    .iter()
                    .map(|r| format!("'{}'", r.id.replace('\'', "''")))
                    .join(", ")
            );

            let existing = self
                .table
                .count_rows(Some(filter))
                .await
                .map_err(|e| RagError::Database(format!("Failed to check chunk ids: {}", e)))?;

            if existing > 0 {
                return Err(RagError::DuplicateChunkId(
                    self.first_existing_id(records).await?,
                ));
            }
        }

        Ok(())
    }

    async fn first_existing_id(&self, records: &[ChunkRecord]) -> Result<String> {
        for record in records {
            let filter = format!("id = '{}'", record.id.replace('\'', "''"));
            let count = self
                .table
                .count_rows(Some(filter))
                .await
                .map_err(|e| RagError::Database(format!("Failed to check chunk id: {}", e)))?;
            if count > 0 {
                return Ok(record.id.clone());
            }
        }

        warn!("Duplicate lookup matched but no single id was found");
        Ok(String::new())
    }

    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let dimension = self.dimension;

        let mut flat_values = Vec::with_capacity(len * dimension);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.id.as_str()),
            )),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.text.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.source_path.as_str()),
            )),
            Arc::new(UInt32Array::from(
                records.iter().map(|r| r.page).collect::<Vec<_>>(),
            )),
        ];

        RecordBatch::try_new(chunk_schema(dimension), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }
}

fn chunk_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        })
        .ok_or_else(|| {
            RagError::Database("Could not find vector column or determine dimension".to_string())
        })
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let sources = string_column(batch, "source_path")?;

    let pages = batch
        .column_by_name("page")
        .ok_or_else(|| RagError::Database("Missing page column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database("Invalid page column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| ScoredChunk {
            id: ids.value(row).to_string(),
            text: texts.value(row).to_string(),
            source_path: sources.value(row).to_string(),
            page: (!pages.is_null(row)).then(|| pages.value(row)),
            distance: distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect())
}

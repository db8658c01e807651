use super::*;
use tempfile::TempDir;

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::connect(&temp_dir.path().join("vectors"))
        .await
        .expect("should connect vector store");
    (store, temp_dir)
}

fn record(id: &str, vector: Vec<f32>) -> ChunkRecord {
    ChunkRecord {
        id: id.to_string(),
        vector,
        text: format!("text for chunk {}", id),
        source_path: "data/manual.pdf".to_string(),
        page: id.parse::<u32>().ok().map(|n| n + 1),
    }
}

#[tokio::test]
async fn create_and_list_collections() {
    let (store, _temp_dir) = create_test_store().await;

    assert!(
        store
            .list_collections()
            .await
            .expect("should list")
            .is_empty()
    );

    let collection = store
        .create_collection("pdf_embeddings", 3)
        .await
        .expect("should create collection");
    assert_eq!(collection.name(), "pdf_embeddings");
    assert_eq!(collection.dimension(), 3);
    assert_eq!(collection.count().await.expect("should count"), 0);

    let names = store.list_collections().await.expect("should list");
    assert_eq!(names, vec!["pdf_embeddings".to_string()]);
}

#[tokio::test]
async fn open_missing_collection_fails() {
    let (store, _temp_dir) = create_test_store().await;

    let result = store.open_collection("absent").await;
    assert!(matches!(result, Err(RagError::CollectionNotFound(name)) if name == "absent"));
}

#[tokio::test]
async fn drop_is_idempotent() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");

    assert!(store.drop_collection("docs").await.expect("should drop"));
    assert!(!store.drop_collection("docs").await.expect("should drop again"));
    assert!(store.open_collection("docs").await.is_err());
}

#[tokio::test]
async fn create_replaces_existing_collection() {
    let (store, _temp_dir) = create_test_store().await;
    let first = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");
    first
        .add(&[record("0", vec![1.0, 0.0]), record("1", vec![0.0, 1.0])])
        .await
        .expect("should add");

    let second = store
        .create_collection("docs", 4)
        .await
        .expect("should recreate collection");
    assert_eq!(second.count().await.expect("should count"), 0);

    let reopened = store
        .open_collection("docs")
        .await
        .expect("should reopen collection");
    assert_eq!(reopened.dimension(), 4);
}

#[tokio::test]
async fn query_returns_nearest_first() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 3)
        .await
        .expect("should create collection");

    collection
        .add(&[
            record("0", vec![1.0, 0.0, 0.0]),
            record("1", vec![0.0, 1.0, 0.0]),
            record("2", vec![0.7, 0.7, 0.0]),
        ])
        .await
        .expect("should add");

    let results = collection
        .query(&[0.9, 0.1, 0.0], 2)
        .await
        .expect("should query");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "0");
    assert_eq!(results[1].id, "2");
    assert!(results[0].distance <= results[1].distance);
    assert_eq!(results[0].text, "text for chunk 0");
    assert_eq!(results[0].source_path, "data/manual.pdf");
    assert_eq!(results[0].page, Some(1));
}

#[tokio::test]
async fn query_with_large_k_returns_everything() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");
    collection
        .add(&[record("0", vec![1.0, 0.0]), record("1", vec![0.0, 1.0])])
        .await
        .expect("should add");

    let results = collection
        .query(&[1.0, 1.0], 10)
        .await
        .expect("should query");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn query_on_empty_collection_is_empty() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");

    let results = collection
        .query(&[1.0, 0.0], 3)
        .await
        .expect("should query");
    assert!(results.is_empty());
}

#[tokio::test]
async fn query_dimension_mismatch_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");
    collection
        .add(&[record("0", vec![1.0, 0.0])])
        .await
        .expect("should add");

    let result = collection.query(&[1.0, 0.0, 0.0], 3).await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[tokio::test]
async fn duplicate_ids_within_batch_are_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");

    let result = collection
        .add(&[
            record("0", vec![1.0, 0.0]),
            record("1", vec![0.0, 1.0]),
            record("0", vec![0.5, 0.5]),
        ])
        .await;

    assert!(matches!(result, Err(RagError::DuplicateChunkId(id)) if id == "0"));
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn duplicate_ids_already_stored_are_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");
    collection
        .add(&[record("0", vec![1.0, 0.0])])
        .await
        .expect("should add");

    let result = collection
        .add(&[record("1", vec![0.0, 1.0]), record("0", vec![0.5, 0.5])])
        .await;

    assert!(matches!(result, Err(RagError::DuplicateChunkId(id)) if id == "0"));
    assert_eq!(collection.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn wrong_record_dimension_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .create_collection("docs", 2)
        .await
        .expect("should create collection");

    let result = collection.add(&[record("0", vec![1.0, 0.0, 0.0])]).await;
    assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
}

#[tokio::test]
async fn zero_dimension_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let result = store.create_collection("docs", 0).await;
    assert!(matches!(result, Err(RagError::Validation(_))));
}

#[tokio::test]
async fn data_persists_across_connections() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    {
        let store = VectorStore::connect(&path)
            .await
            .expect("should connect vector store");
        let collection = store
            .create_collection("docs", 2)
            .await
            .expect("should create collection");
        collection
            .add(&[record("0", vec![1.0, 0.0])])
            .await
            .expect("should add");
    }

    let store = VectorStore::connect(&path)
        .await
        .expect("should reconnect vector store");
    let collection = store
        .open_collection("docs")
        .await
        .expect("should open collection");
    assert_eq!(collection.count().await.expect("should count"), 1);
    assert_eq!(collection.dimension(), 2);
}

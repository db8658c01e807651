use super::*;
use crate::database::{ChunkRecord, VectorStore};
use crate::sessions::{MemorySessionStore, SqliteSessionStore};
use crate::test_support::{FailingEmbedder, KeywordEmbedder, TEST_DIMENSION, keyword_vector};
use tempfile::TempDir;

const PASSAGES: [&str; 3] = [
    "Refunds are processed within 14 days of the return request.",
    "Shipping is free for orders above fifty dollars.",
    "Support is available by email on weekdays.",
];

async fn collection_with(passages: &[&str]) -> (TempDir, Collection) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::connect(&temp_dir.path().join("vectors"))
        .await
        .expect("should connect vector store");
    let collection = store
        .create_collection("pdf_embeddings", TEST_DIMENSION)
        .await
        .expect("should create collection");

    let records: Vec<ChunkRecord> = passages
        .iter()
        .enumerate()
        .map(|(i, text)| ChunkRecord {
            id: i.to_string(),
            vector: keyword_vector(text),
            text: (*text).to_string(),
            source_path: "data/policy.pdf".to_string(),
            page: Some(i as u32 + 1),
        })
        .collect();
    collection.add(&records).await.expect("should add");

    (temp_dir, collection)
}

fn service(collection: Collection, embedder: Arc<dyn Embedder>) -> RetrievalService {
    RetrievalService::new(
        embedder,
        collection,
        Arc::new(MemorySessionStore::new()),
        3,
    )
}

#[tokio::test]
async fn ask_returns_best_chunk_and_records_turn() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    let response = service
        .ask("s1", "How many days until refunds are processed?")
        .await
        .expect("should answer");

    assert_eq!(response.kind, AnswerKind::Retrieved);
    assert_eq!(response.answer, PASSAGES[0]);
    assert_eq!(
        response.history,
        vec![Turn::new(
            "How many days until refunds are processed?",
            PASSAGES[0]
        )]
    );
}

#[tokio::test]
async fn sessions_do_not_leak_into_each_other() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    service
        .ask("s1", "refunds processed")
        .await
        .expect("should answer");
    service
        .ask("s1", "shipping free orders")
        .await
        .expect("should answer");
    let other = service
        .ask("s2", "support email")
        .await
        .expect("should answer");

    assert_eq!(other.history.len(), 1);
    assert_eq!(other.answer, PASSAGES[2]);
    assert_eq!(
        service.sessions().get("s1").await.expect("should get").len(),
        2
    );
}

#[tokio::test]
async fn empty_question_leaves_history_untouched() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let embedder = Arc::new(KeywordEmbedder::default());
    let service = service(collection, Arc::clone(&embedder) as Arc<dyn Embedder>);

    service
        .ask("s1", "refunds processed")
        .await
        .expect("should answer");
    let calls_before = embedder.calls();

    let response = service.ask("s1", "   ").await.expect("should answer");

    assert_eq!(response.kind, AnswerKind::EmptyQuery);
    assert_eq!(response.answer, EMPTY_QUESTION_ANSWER);
    assert_eq!(response.history.len(), 1);
    assert_eq!(embedder.calls(), calls_before);
}

#[tokio::test]
async fn empty_collection_yields_no_match_sentinel() {
    let (_temp_dir, collection) = collection_with(&[]).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    let response = service
        .ask("s1", "anything at all")
        .await
        .expect("should answer");

    assert_eq!(response.kind, AnswerKind::NoMatch);
    assert_eq!(response.answer, NO_MATCH_ANSWER);
    assert_eq!(
        response.history,
        vec![Turn::new("anything at all", NO_MATCH_ANSWER)]
    );
}

#[tokio::test]
async fn blank_session_id_is_rejected() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    let result = service.ask("  ", "refunds").await;
    assert!(matches!(result, Err(RagError::Validation(_))));
}

#[tokio::test]
async fn embedding_failure_records_nothing() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(FailingEmbedder));

    let result = service.ask("s1", "refunds").await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
    assert!(
        service
            .sessions()
            .get("s1")
            .await
            .expect("should get")
            .is_empty()
    );
}

#[tokio::test]
async fn search_ranks_by_distance() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    let results = service
        .search("free shipping for orders", 3)
        .await
        .expect("should search");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].text, PASSAGES[1]);
    assert_eq!(results[0].page, Some(2));
    assert!(
        results
            .windows(2)
            .all(|pair| pair[0].distance <= pair[1].distance)
    );
}

#[tokio::test]
async fn manifest_check_tolerates_missing_manifest() {
    let (temp_dir, collection) = collection_with(&PASSAGES).await;
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open database");
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    service
        .check_manifest(&database)
        .await
        .expect("should check manifest");
}

async fn assert_deleted_session_starts_fresh(service: &RetrievalService) {
    service
        .ask("Refund chat", "refunds processed")
        .await
        .expect("should answer");
    let second = service
        .ask("Refund chat", "shipping free orders")
        .await
        .expect("should answer");
    assert_eq!(second.history.len(), 2);

    assert!(
        service
            .sessions()
            .delete("Refund chat")
            .await
            .expect("should delete")
    );

    let fresh = service
        .ask("Refund chat", "support email")
        .await
        .expect("should answer");
    assert_eq!(
        fresh.history,
        vec![Turn::new("support email", PASSAGES[2])]
    );
}

#[tokio::test]
async fn deleted_memory_session_starts_fresh() {
    let (_temp_dir, collection) = collection_with(&PASSAGES).await;
    let service = service(collection, Arc::new(KeywordEmbedder::default()));

    assert_deleted_session_starts_fresh(&service).await;
}

#[tokio::test]
async fn deleted_sqlite_session_starts_fresh() {
    let (temp_dir, collection) = collection_with(&PASSAGES).await;
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open database");
    let service = RetrievalService::new(
        Arc::new(KeywordEmbedder::default()),
        collection,
        Arc::new(SqliteSessionStore::new(database.clone())),
        3,
    );

    assert_deleted_session_starts_fresh(&service).await;

    let turns = database
        .get_turns("Refund_chat")
        .await
        .expect("should read turns");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].turn_index, 0);
}

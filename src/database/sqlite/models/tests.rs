use chrono::Utc;

use super::*;

#[test]
fn manifest_built_with_matches_model_name() {
    let manifest = CollectionManifest {
        name: "pdf_embeddings".to_string(),
        model: "all-minilm".to_string(),
        dimension: 384,
        chunk_count: 12,
        document_count: 2,
        created_at: Utc::now().naive_utc(),
    };

    assert!(manifest.built_with("all-minilm"));
    assert!(!manifest.built_with("nomic-embed-text"));
}

#[test]
fn turn_record_serialization() {
    let turn = TurnRecord {
        session_id: "chat_1".to_string(),
        turn_index: 0,
        question: "What is the refund window?".to_string(),
        answer: "Refunds are processed within 14 days.".to_string(),
        created_at: Utc::now().naive_utc(),
    };

    let json = serde_json::to_string(&turn).expect("should serialize turn");
    let decoded: TurnRecord = serde_json::from_str(&json).expect("should deserialize turn");
    assert_eq!(decoded, turn);
}

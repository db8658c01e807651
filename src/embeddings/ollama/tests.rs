use super::*;
use crate::config::OllamaConfig;
use crate::test_support::keyword_vector;
use serde_json::{Value, json};
use serial_test::serial;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// `/api/embed` stand-in that derives each vector from its input text alone
struct KeywordEmbedEndpoint;

impl Respond for KeywordEmbedEndpoint {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(keyword_vector)
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

async fn keyword_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbedEndpoint)
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer) -> OllamaConfig {
    OllamaConfig {
        host: server.address().ip().to_string(),
        port: server.address().port(),
        model: "all-minilm".to_string(),
        batch_size: 2,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&config_for(server))
        .expect("should create client")
        .with_retry_attempts(1)
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("should create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert!(client.api_key.is_none());
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("should create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
#[serial]
fn missing_credential_fails_fast() {
    // SAFETY: serialized with every other test touching this variable
    unsafe { std::env::remove_var("PDF_RAG_CHAT_TEST_TOKEN") };

    let config = OllamaConfig {
        api_key_env: Some("PDF_RAG_CHAT_TEST_TOKEN".to_string()),
        ..OllamaConfig::default()
    };

    let result = OllamaClient::new(&config);
    assert!(matches!(result, Err(RagError::Config(msg)) if msg.contains("PDF_RAG_CHAT_TEST_TOKEN")));
}

#[tokio::test]
async fn embed_sends_model_and_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "all-minilm",
            "input": ["hello world"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "all-minilm",
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let embedding = tokio::task::spawn_blocking(move || client.embed("hello world"))
        .await
        .expect("should join")
        .expect("should embed");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn batch_is_split_by_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["a", "b"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["c"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.5, 0.5]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("should join")
        .expect("should embed batch");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test]
async fn response_count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("should join");

    assert!(matches!(result, Err(RagError::Embedding(msg)) if msg.contains("Mismatch")));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.embed("question"))
        .await
        .expect("should join");

    assert!(matches!(result, Err(RagError::Embedding(msg)) if msg.contains("400")));
}

#[tokio::test]
async fn health_check_accepts_implicit_latest_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "nomic-embed-text:latest" },
                { "name": "all-minilm:latest", "size": 45_000_000 }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("should join");

    assert!(result.is_ok(), "health check should pass: {:?}", result);
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3:latest" }]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = tokio::task::spawn_blocking(move || OllamaClient::connect(&config))
        .await
        .expect("should join");

    match result {
        Err(RagError::Config(msg)) => {
            assert!(msg.contains("all-minilm"));
            assert!(msg.contains("llama3:latest"));
        }
        other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
#[serial]
async fn bearer_credential_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.25, 0.75]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // SAFETY: serialized with every other test touching this variable
    unsafe { std::env::set_var("PDF_RAG_CHAT_TEST_TOKEN", "secret-token") };
    let config = OllamaConfig {
        api_key_env: Some("PDF_RAG_CHAT_TEST_TOKEN".to_string()),
        ..config_for(&server)
    };
    let client = OllamaClient::new(&config);
    // SAFETY: as above
    unsafe { std::env::remove_var("PDF_RAG_CHAT_TEST_TOKEN") };

    let client = client.expect("should create client").with_retry_attempts(1);
    let embedding = tokio::task::spawn_blocking(move || client.embed("secured"))
        .await
        .expect("should join")
        .expect("should embed with credential");

    assert_eq!(embedding, vec![0.25, 0.75]);
}

#[tokio::test]
async fn embedding_is_deterministic() {
    let server = keyword_server().await;
    let client = client_for(&server);

    let (first, second) = tokio::task::spawn_blocking(move || {
        (
            client.embed("refund policy").expect("should embed"),
            client.embed("refund policy").expect("should embed again"),
        )
    })
    .await
    .expect("should join");

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn batch_matches_single_embeddings() {
    let server = keyword_server().await;
    let client = client_for(&server);
    let texts = vec![
        "refunds within fourteen days".to_string(),
        "free shipping".to_string(),
        "support by email".to_string(),
    ];

    let (batch, singles) = tokio::task::spawn_blocking(move || {
        let batch = client.embed_batch(&texts).expect("should embed batch");
        let singles: Vec<Vec<f32>> = texts
            .iter()
            .map(|text| client.embed(text).expect("should embed single"))
            .collect();
        (batch, singles)
    })
    .await
    .expect("should join");

    assert_eq!(batch.len(), 3);
    assert_eq!(batch, singles);
}

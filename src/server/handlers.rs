use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::AppState;
use super::errors::ApiError;
use crate::sessions::{Turn, format_transcript};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(alias = "chat_id")]
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHistory {
    pub session_id: String,
    pub history: Vec<Turn>,
}

#[inline]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let collection = state.service.collection();
    let chunks = collection.count().await?;
    Ok(Json(json!({
        "status": "ok",
        "collection": collection.name(),
        "chunks": chunks,
        "top_k": state.service.top_k(),
    })))
}

#[inline]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    debug!("Received question for session {}", request.session_id);

    let response = state
        .service
        .ask(&request.session_id, &request.question)
        .await?;
    Ok(Json(response))
}

#[inline]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.service.sessions().list().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

#[inline]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.service.sessions().get(&session_id).await?;
    Ok(Json(SessionHistory {
        session_id,
        history,
    }))
}

#[inline]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.service.sessions().delete(&session_id).await?;
    let body: Value = json!({ "session_id": session_id, "deleted": deleted });
    Ok(Json(body))
}

#[inline]
pub async fn transcript(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.service.sessions().get(&session_id).await?;
    if history.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No messages in session '{}'",
            session_id
        )));
    }

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format_transcript(&history),
    ))
}

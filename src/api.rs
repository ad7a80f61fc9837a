use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Json, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    app_state::AppState,
    chat::{self, ChatReply},
    feedback::{FeedbackError, FEEDBACK_LIST_LIMIT},
    models::{utc_timestamp, ChatMessage, FeedbackRecord, HistoryMessage},
};

/// Cabecera opcional con la que el cliente correlaciona sus peticiones.
pub const SESSION_HEADER: &str = "x-session-id";

type ApiError = (StatusCode, Json<Value>);

// --- Payloads de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
    #[serde(default)]
    history: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
pub struct FeedbackPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route(
            "/feedback",
            get(list_feedback_handler).post(submit_feedback_handler),
        )
        .route("/health", get(health_handler))
        .with_state(app_state)
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatReply>, ApiError> {
    let ip = peer.ip().to_string();
    let result = chat::chat(
        &state,
        &payload.message,
        &payload.history,
        &ip,
        session_header(&headers),
    )
    .await;

    match result {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            error!("Error al procesar el chat: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("{e:#}")})),
            ))
        }
    }
}

#[axum::debug_handler]
async fn submit_feedback_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<FeedbackPayload>,
) -> Result<Json<Value>, ApiError> {
    let store = state.feedback.clone();
    let result = tokio::task::spawn_blocking(move || {
        store.submit(payload.name.as_deref(), &payload.message)
    })
    .await;

    let record = match result {
        Ok(Ok(record)) => record,
        Ok(Err(FeedbackError::EmptyMessage)) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": FeedbackError::EmptyMessage.to_string()})),
            ));
        }
        Ok(Err(e)) => {
            error!("Error guardando feedback: {e}");
            return Err(feedback_failure(e.to_string()));
        }
        Err(e) => {
            error!("La tarea de guardado de feedback falló: {e}");
            return Err(feedback_failure(e.to_string()));
        }
    };
    info!("Feedback #{} guardado.", record.id);

    // También queda en el log de conversaciones, con su propia sesión.
    let ip = peer.ip().to_string();
    let session_id = chat::resolve_session_id(session_header(&headers));
    let author = record.name.as_deref().unwrap_or("Anonymous");
    chat::record_exchange(
        &state,
        &session_id,
        &ip,
        vec![
            ChatMessage::system(format!("feedback from {author}")),
            ChatMessage::user(record.message.clone()),
        ],
    )
    .await;

    Ok(Json(json!({"ok": true})))
}

fn feedback_failure(message: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"ok": false, "error": message})),
    )
}

#[axum::debug_handler]
async fn list_feedback_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeedbackRecord>>, ApiError> {
    let store = state.feedback.clone();
    let rows = tokio::task::spawn_blocking(move || store.list_recent(FEEDBACK_LIST_LIMIT))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    match rows {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            error!("Error listando feedback: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": e})),
            ))
        }
    }
}

#[axum::debug_handler]
async fn health_handler() -> Json<Value> {
    Json(json!({"ok": true, "time": utc_timestamp()}))
}

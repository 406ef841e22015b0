//! HTTP request handlers

use super::sse::chat_stream;
use super::types::{
    ChatStreamQuery, ErrorResponse, HealthResponse, HistoryEntry, HomeResponse,
    ThreadListResponse, ThreadMessagesResponse,
};
use super::AppState;
use crate::runtime::CheckpointStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        // Chat
        .route("/chat_stream/:message", get(stream_chat))
        // Threads
        .route("/api/threads", get(list_threads))
        .route("/api/threads/:id/messages", get(thread_messages))
        .with_state(state)
}

async fn home() -> Json<HomeResponse> {
    Json(HomeResponse {
        message: "Welcome to the Conductor API",
        documentation: "Stream a reply with GET /chat_stream/{message}?thread_id=",
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Conductor is running smoothly",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================
// Chat Stream
// ============================================================

async fn stream_chat(
    State(state): State<AppState>,
    Path(message): Path<String>,
    Query(query): Query<ChatStreamQuery>,
) -> Result<Response, AppError> {
    let text = message.trim().to_string();
    if text.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    let thread_id = query
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let threads = state.threads.clone();
    let run_thread = thread_id.clone();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        // The outcome reaches the client as the stream's final event
        let _ = threads.submit(&run_thread, &text, &tx, &run_cancel).await;
    });

    tracing::info!(thread_id = %thread_id, "Chat stream opened");
    Ok(chat_stream(thread_id, rx, cancel.drop_guard()).into_response())
}

// ============================================================
// Threads
// ============================================================

async fn list_threads(State(state): State<AppState>) -> Result<Json<ThreadListResponse>, AppError> {
    let threads = state
        .threads
        .store()
        .list_threads()
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ThreadListResponse { threads }))
}

async fn thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, AppError> {
    let messages = state
        .threads
        .store()
        .history(&thread_id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ThreadMessagesResponse {
        thread_id,
        messages: HistoryEntry::visible(messages),
    }))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

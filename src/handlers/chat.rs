// src/handlers/chat.rs
use crate::chat::ChatTurn;
use crate::error::AppError;
use crate::models::{ChatMessage, ChatState};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub chat_state: ChatState,
    pub chat_messages: Vec<ChatMessage>,
}

pub fn chat_routes() -> Router {
    Router::new().route(
        "/api/sessions/:session_id/chat",
        get(get_chat_history).post(ask_question),
    )
}

/// GET /api/sessions/:session_id/chat
async fn get_chat_history(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    let session = state.session(&session_id).await?;
    Ok(Json(ChatHistoryResponse {
        chat_state: session.chat_state(),
        chat_messages: session.chat_messages().await,
        session_id,
    }))
}

/// POST /api/sessions/:session_id/chat - ask about the analyzed recording
///
/// Questions from the same session queue behind each other.
async fn ask_question(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<ChatTurn>, AppError> {
    let session = state.session(&session_id).await?;
    let turn = state.chat.ask(&session, &request.question).await?;
    Ok(Json(turn))
}

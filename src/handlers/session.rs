// src/handlers/session.rs
use crate::error::AppError;
use crate::session::{Session, SessionSnapshot};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn session_routes() -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:session_id",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/:session_id/progress", get(get_progress))
        .route("/api/sessions/:session_id/progress/ws", get(progress_websocket))
}

/// POST /api/sessions - start a new session
async fn create_session(
    Extension(state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let session = state.sessions.create().await;
    (StatusCode::CREATED, Json(session.snapshot().await))
}

/// GET /api/sessions/:session_id - everything the page needs to re-render
async fn get_session(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(&session_id).await?;
    Ok(Json(session.snapshot().await))
}

/// DELETE /api/sessions/:session_id - end the session and clean up its files
async fn delete_session(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    state.close_session(&session_id).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "message": "Session closed",
    })))
}

/// GET /api/sessions/:session_id/progress - latest pipeline progress
async fn get_progress(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&session_id).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "progress": session.progress().latest(),
    })))
}

/// GET /api/sessions/:session_id/progress/ws - live progress feed
async fn progress_websocket(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.session(&session_id).await?;
    Ok(ws.on_upgrade(move |socket| stream_progress(socket, session)))
}

async fn stream_progress(stream: WebSocket, session: Arc<Session>) {
    let (mut sender, mut receiver) = stream.split();
    let mut updates = session.progress().subscribe();
    let closed = session.cancellation();

    tracing::debug!("📡 Progress listener attached to session {}", session.id());

    let current = updates.borrow_and_update().clone();
    if let Some(update) = current {
        if send_update(&mut sender, &update).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(update) = latest {
                    if send_update(&mut sender, &update).await.is_err() {
                        break;
                    }
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = closed.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::debug!("📡 Progress listener detached from session {}", session.id());
}

async fn send_update<S>(sender: &mut S, update: &crate::pipeline::ProgressUpdate) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let payload = serde_json::to_string(update).map_err(|e| {
        tracing::warn!("Failed to serialize progress update: {}", e);
    })?;
    sender.send(Message::Text(payload)).await.map_err(|_| ())
}

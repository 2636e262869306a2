// src/handlers/status.rs
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

// API Status endpoint
async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let upload_dir_writable = tokio::fs::create_dir_all(&state.config.upload_dir).await.is_ok();

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.len().await,
        "services": {
            "pipeline": state.config.pipeline.program,
            "llm": if state.chat.is_configured() { "configured" } else { "not_configured" },
            "upload_dir": if upload_dir_writable { "ready" } else { "unavailable" },
        },
        "uploads": {
            "allowed_extensions": state.config.allowed_extensions,
            "max_upload_mb": state.config.max_upload_bytes / (1024 * 1024),
        }
    }))
}

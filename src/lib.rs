// lib.rs - SpeechMaster: upload a talk, get it analyzed, ask questions about it
pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod services;
pub mod session;
pub mod upload;

use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use chat::ChatController;
pub use config::AppConfig;
pub use error::AppError;
pub use session::{Session, SessionStore};
pub use upload::UploadStore;

// AppState holds the session store, upload storage, the analysis pipeline and the chat backend
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionStore,
    pub uploads: UploadStore,
    pub pipeline: Arc<dyn pipeline::AnalysisPipeline>,
    pub chat: ChatController,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pipeline: Arc<dyn pipeline::AnalysisPipeline>,
        assistant: Option<Arc<dyn llm::AnalysisAssistant>>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(config.session_ttl),
            uploads: UploadStore::new(config.upload_dir.clone(), config.allowed_extensions.clone()),
            pipeline,
            chat: ChatController::new(assistant),
            config,
        }
    }

    pub async fn session(&self, id: &str) -> Result<Arc<Session>, AppError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// End a session: cancel its pipeline runs and delete its uploads.
    pub async fn close_session(&self, id: &str) -> Result<(), AppError> {
        let session = self
            .sessions
            .remove(id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        self.discard_uploads(&session).await;
        Ok(())
    }

    pub async fn sweep_idle_sessions(&self) -> usize {
        let expired = self.sessions.expire_idle(chrono::Utc::now()).await;
        for session in &expired {
            self.discard_uploads(session).await;
        }
        expired.len()
    }

    async fn discard_uploads(&self, session: &Session) {
        for file in session.uploads().await {
            self.uploads.remove(&file).await;
        }
    }
}

/// Build the application with all routes and shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .merge(handlers::ui::ui_routes())
        .merge(handlers::session::session_routes())
        .merge(handlers::upload::upload_routes(max_upload_bytes))
        .merge(handlers::chat::chat_routes())
        .merge(handlers::video::video_routes())
        .merge(handlers::status::status_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, UploadedFile};
    use crate::pipeline::{AnalysisPipeline, PipelineError, ProgressSink};
    use async_trait::async_trait;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    struct NoopPipeline;

    #[async_trait]
    impl AnalysisPipeline for NoopPipeline {
        async fn run(
            &self,
            _run_id: &str,
            _video: &Path,
            _progress: ProgressSink,
            _cancel: CancellationToken,
        ) -> Result<AnalysisResult, PipelineError> {
            Ok(AnalysisResult::default())
        }
    }

    fn state_in(dir: &Path) -> AppState {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.upload_dir = dir.to_path_buf();
        AppState::new(config, Arc::new(NoopPipeline), None)
    }

    async fn stored_upload(state: &AppState, session: &Session) -> UploadedFile {
        let file = state.uploads.persist("talk.mp4", b"video").await.unwrap();
        session.register_upload(file.clone()).await;
        file
    }

    #[tokio::test]
    async fn test_close_session_deletes_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let session = state.sessions.create().await;
        let file = stored_upload(&state, &session).await;
        assert!(file.stored_path.exists());

        state.close_session(session.id()).await.unwrap();
        assert!(!file.stored_path.exists());
        assert!(matches!(
            state.session(session.id()).await,
            Err(AppError::SessionNotFound(_))
        ));
        assert!(matches!(
            state.close_session(session.id()).await,
            Err(AppError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let session = state.sessions.create().await;
        let file = stored_upload(&state, &session).await;

        assert_eq!(state.sweep_idle_sessions().await, 0);
        assert!(file.stored_path.exists());
        assert!(state.session(session.id()).await.is_ok());
    }
}

// src/handlers/upload.rs
use crate::error::AppError;
use crate::models::file::FileUploadResponse;
use crate::models::{AnalysisResult, UploadedFile};
use crate::render::{render, RenderedAnalysis};
use crate::services::AnalysisService;
use crate::session::Session;
use crate::upload::{content_key, validate_extension, UploadError};
use crate::AppState;
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub session_id: String,
    pub file: FileUploadResponse,
    pub analysis: RenderedAnalysis,
    pub video_url: Option<String>,
    pub subtitled_video_available: bool,
}

pub fn upload_routes(max_upload_bytes: usize) -> Router {
    let upload = Router::new()
        .route("/api/sessions/:session_id/upload", post(upload_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/api/sessions/:session_id/analyze", post(retry_analysis))
        .route("/api/sessions/:session_id/analysis", get(get_analysis))
        .merge(upload)
}

/// POST /api/sessions/:session_id/upload - store a video and analyze it
///
/// Re-uploading identical bytes in the same session returns the cached
/// analysis without running the pipeline again.
pub async fn upload_video(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let session = state.session(&session_id).await?;
    let (original_name, data) = read_video_field(&mut multipart).await?;

    validate_extension(&original_name, state.uploads.allowed_extensions())?;
    tracing::info!("Processing upload '{}' for session {}", original_name, session_id);

    let candidate = match session.find_upload_by_content(&content_key(&data)).await {
        Some(existing) => existing,
        None => state.uploads.persist(&original_name, &data).await?,
    };
    let (file, reused) = adopt_upload(&state, &session, candidate).await;

    let analysis = AnalysisService::analyze(session, file.clone(), state.pipeline.clone()).await?;
    Ok(Json(analysis_response(&session_id, &file, reused, &analysis).await))
}

/// POST /api/sessions/:session_id/analyze - retry analysis of the active file
pub async fn retry_analysis(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let session = state.session(&session_id).await?;
    let file = session
        .active_upload()
        .await
        .ok_or_else(|| AppError::NotFound("No uploaded file in this session".to_string()))?;

    let analysis = AnalysisService::analyze(session, file.clone(), state.pipeline.clone()).await?;
    Ok(Json(analysis_response(&session_id, &file, true, &analysis).await))
}

/// GET /api/sessions/:session_id/analysis - cached result only, never runs the pipeline
pub async fn get_analysis(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let session = state.session(&session_id).await?;
    let (file, analysis) = session
        .active_analysis()
        .await
        .ok_or_else(|| AppError::NotFound("No analysis available yet".to_string()))?;

    Ok(Json(analysis_response(&session_id, &file, true, &analysis).await))
}

/// Register `candidate` as the session's active file. When an identical
/// upload got registered first, the duplicate copy on disk is deleted.
async fn adopt_upload(state: &AppState, session: &Session, candidate: UploadedFile) -> (UploadedFile, bool) {
    let (file, reused) = session.register_upload(candidate.clone()).await;
    if reused && file.stored_path != candidate.stored_path {
        tracing::debug!("Discarding duplicate upload {}", candidate.stored_path.display());
        state.uploads.remove(&candidate).await;
    }
    (file, reused)
}

async fn read_video_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), UploadError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let filename = match field.file_name() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                tracing::debug!("Skipping non-file field: {:?}", field.name());
                continue;
            }
        };

        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, data.to_vec()));
    }

    Err(UploadError::MissingFile)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        UploadError::Malformed(e.body_text())
    }
}

async fn analysis_response(
    session_id: &str,
    file: &UploadedFile,
    reused: bool,
    analysis: &AnalysisResult,
) -> AnalysisResponse {
    let rendered = render(analysis);
    let subtitled_video_available = match &rendered.subtitled_video {
        Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
        None => false,
    };

    AnalysisResponse {
        success: true,
        session_id: session_id.to_string(),
        file: FileUploadResponse::from_file(file, reused),
        video_url: rendered
            .subtitled_video
            .as_ref()
            .map(|_| format!("/api/sessions/{}/video", session_id)),
        analysis: rendered,
        subtitled_video_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::config::AppConfig;
    use crate::pipeline::{AnalysisPipeline, PipelineError, ProgressSink};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use std::path::Path as FsPath;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const BOUNDARY: &str = "speechmaster-test-boundary";

    struct CountingPipeline {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisPipeline for CountingPipeline {
        async fn run(
            &self,
            _run_id: &str,
            video: &FsPath,
            _progress: ProgressSink,
            _cancel: CancellationToken,
        ) -> Result<AnalysisResult, PipelineError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(AnalysisResult {
                audio_volume: crate::models::AudioVolume {
                    volume_interpretation: "Too quiet".to_string(),
                },
                transcription: "Hello world".to_string(),
                transcription_srt: "1\n00:00:00,000 --> 00:00:01,000\nHello world\n".to_string(),
                mp4_path: video.to_string_lossy().into_owned(),
            })
        }
    }

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        pipeline: Arc<CountingPipeline>,
        dir: TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = AppConfig::from_lookup(|_| None).unwrap();
            config.upload_dir = dir.path().to_path_buf();
            let pipeline = Arc::new(CountingPipeline {
                runs: AtomicUsize::new(0),
            });
            let state = Arc::new(AppState::new(config, pipeline.clone(), None));
            Self {
                router: build_router(state.clone()),
                state,
                pipeline,
                dir,
            }
        }

        fn runs(&self) -> usize {
            self.pipeline.runs.load(Ordering::SeqCst)
        }

        fn stored_files(&self) -> usize {
            std::fs::read_dir(self.dir.path()).unwrap().count()
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }
    }

    fn upload_request(session_id: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(format!("/api/sessions/{}/upload", session_id))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: String) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_identical_reupload_reuses_analysis() {
        let app = TestApp::new();
        let session = app.state.sessions.create().await;

        let (status, first) = app.send(upload_request(session.id(), "talk.mp4", b"video bytes")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["file"]["reused"], false);
        assert_eq!(first["analysis"]["volume_metric"], "Too quiet");
        assert_eq!(first["analysis"]["subtitle_cues"], 1);
        assert_eq!(app.runs(), 1);

        let (status, second) = app
            .send(upload_request(session.id(), "talk_copy.mp4", b"video bytes"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["file"]["reused"], true);
        assert_eq!(second["file"]["stored_name"], first["file"]["stored_name"]);
        assert_eq!(app.runs(), 1);
        assert_eq!(app.stored_files(), 1);
    }

    #[tokio::test]
    async fn test_cached_analysis_never_runs_pipeline() {
        let app = TestApp::new();
        let session = app.state.sessions.create().await;
        let analysis_uri = format!("/api/sessions/{}/analysis", session.id());

        let (status, _) = app.send(get_request(analysis_uri.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.runs(), 0);

        app.send(upload_request(session.id(), "talk.mp4", b"video bytes")).await;
        let (status, body) = app.send(get_request(analysis_uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["transcription"], "Hello world");
        assert_eq!(app.runs(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let app = TestApp::new();
        let session = app.state.sessions.create().await;

        let (status, body) = app.send(upload_request(session.id(), "notes.txt", b"hello")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["success"], false);
        assert_eq!(app.runs(), 0);
        assert_eq!(app.stored_files(), 0);
    }

    #[tokio::test]
    async fn test_upload_to_unknown_session() {
        let app = TestApp::new();

        let (status, body) = app.send(upload_request("missing", "talk.mp4", b"video bytes")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(app.runs(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_candidate_is_removed() {
        let app = TestApp::new();
        let session = app.state.sessions.create().await;

        let winner = app.state.uploads.persist("talk.mp4", b"video bytes").await.unwrap();
        let loser = app.state.uploads.persist("talk.mp4", b"video bytes").await.unwrap();
        adopt_upload(&app.state, &session, winner.clone()).await;

        let (file, reused) = adopt_upload(&app.state, &session, loser.clone()).await;
        assert!(reused);
        assert_eq!(file, winner);
        assert!(winner.stored_path.exists());
        assert!(!loser.stored_path.exists());
    }
}

// src/handlers/video.rs
use crate::error::AppError;
use crate::render::render;
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoVariant {
    #[default]
    Subtitled,
    Original,
}

#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    #[serde(default)]
    pub variant: VideoVariant,
}

pub fn video_routes() -> Router {
    Router::new().route("/api/sessions/:session_id/video", get(stream_video))
}

/// GET /api/sessions/:session_id/video - stream the analyzed video for browser playback
async fn stream_video(
    Path(session_id): Path<String>,
    Query(query): Query<VideoQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, AppError> {
    let session = state.session(&session_id).await?;
    let (_, analysis) = session
        .active_analysis()
        .await
        .ok_or_else(|| AppError::NotFound("No analysis available yet".to_string()))?;

    let rendered = render(&analysis);
    let path = match query.variant {
        VideoVariant::Subtitled => rendered.subtitled_video,
        VideoVariant::Original => rendered.source_video,
    }
    .ok_or_else(|| AppError::NotFound("The analysis has no video path".to_string()))?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("Video {} not found", path.display())));
        }
        Err(e) => {
            return Err(AppError::Internal(format!("Failed to open {}: {}", path.display(), e)));
        }
    };
    let size = file.metadata().await.map(|m| m.len()).ok();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CACHE_CONTROL, "private, max-age=3600");
    if let Some(size) = size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }

    builder
        .body(axum::body::Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn content_type_for(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("mp4") | Some("mpeg4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(FsPath::new("/tmp/talk_with_subtitles.mp4")), "video/mp4");
        assert_eq!(content_type_for(FsPath::new("/tmp/TALK.MPEG4")), "video/mp4");
        assert_eq!(content_type_for(FsPath::new("/tmp/talk")), "application/octet-stream");
    }
}

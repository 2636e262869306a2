use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Structured access log for every HTTP request. Also tags the response with
/// an `x-request-id` header so UI error reports can be matched to log lines.
pub async fn request_logging_middleware(
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().clone();
    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());
    let session_id = session_id_from_path(uri.path()).unwrap_or("-").to_owned();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %matched_path,
        session_id = %session_id,
        "incoming request"
    );

    let mut response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    match status {
        500..=599 => tracing::error!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            session_id = %session_id,
            status,
            duration_ms = %duration_ms,
            "request completed (server error)"
        ),
        400..=499 => tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            session_id = %session_id,
            status,
            duration_ms = %duration_ms,
            "request completed (client error)"
        ),
        _ => tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            session_id = %session_id,
            status,
            duration_ms = %duration_ms,
            "request completed"
        ),
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    Ok(response)
}

fn session_id_from_path(path: &str) -> Option<&str> {
    path.strip_prefix("/api/sessions/")?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_path() {
        assert_eq!(session_id_from_path("/api/sessions/abc/chat"), Some("abc"));
        assert_eq!(session_id_from_path("/api/sessions/abc"), Some("abc"));
        assert_eq!(session_id_from_path("/api/sessions/"), None);
        assert_eq!(session_id_from_path("/api/status"), None);
    }
}

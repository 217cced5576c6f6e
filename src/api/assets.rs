use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::error::RelayError;
use crate::state::AppState;

const INDEX_FILE: &str = "index.html";

/// Served at `/` when the static directory has no `index.html`.
const FALLBACK_LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Arlo</title></head>
<body>
<h1>Arlo relay</h1>
<p>POST a JSON body <code>{"question": "..."}</code> to <code>/ask</code> for a streamed answer.</p>
</body>
</html>
"#;

/// Serve the landing document.
pub async fn landing_handler(state: &AppState) -> Response {
    let index = Path::new(&state.config.server.static_dir).join(INDEX_FILE);
    match tokio::fs::read(&index).await {
        Ok(bytes) => file_response(bytes, "text/html; charset=utf-8"),
        Err(err) => {
            tracing::debug!(path = %index.display(), error = %err, "serving built-in landing page");
            file_response(
                FALLBACK_LANDING_PAGE.as_bytes().to_vec(),
                "text/html; charset=utf-8",
            )
        }
    }
}

/// Serve a file below the static directory, or `404`.
pub async fn asset_handler(state: &AppState, path: &str) -> Response {
    let Some(relative) = sanitize_asset_path(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let full_path = Path::new(&state.config.server.static_dir).join(&relative);

    match tokio::fs::read(&full_path).await {
        Ok(bytes) => file_response(bytes, content_type_for(&relative)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND.into_response()
        }
        // Directories and unreadable files.
        Err(err) if full_path.is_dir() => {
            tracing::debug!(path = %full_path.display(), error = %err, "asset is a directory");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            tracing::warn!(path = %full_path.display(), error = %err, "failed to read asset");
            RelayError::Internal("Failed to read asset".to_string()).into_response()
        }
    }
}

/// Turn a request path into a relative path made only of normal components.
fn sanitize_asset_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains('\\') {
        return None;
    }
    let relative = Path::new(trimmed);
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| relative.to_path_buf())
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn file_response(bytes: Vec<u8>, content_type: &'static str) -> Response {
    let mut response = Response::new(Body::from(bytes));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(content_type),
    );
    response
}

use crate::util::truncate_on_char_boundary;

const MAX_DIAGNOSTIC_LEN: usize = 500;

/// Error type shared by every stage of the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("API Error: {status} - {message}")]
    UpstreamRejected { status: u16, message: String },
    #[error("Frame decode error: {0}")]
    FrameDecode(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    BadGateway,
    Upstream(u16),
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::UpstreamUnavailable(_) | RelayError::Transport(_) => {
                ErrorCategory::BadGateway
            }
            RelayError::UpstreamRejected { status, .. } => ErrorCategory::Upstream(*status),
            RelayError::Config(_) | RelayError::FrameDecode(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
        }
    }

    /// Build an [`RelayError::UpstreamRejected`] from a non-success status and its body.
    #[must_use]
    pub fn rejected(status: http::StatusCode, body: &[u8]) -> Self {
        RelayError::UpstreamRejected {
            status: status.as_u16(),
            message: upstream_diagnostic(body),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::Upstream(status) => http::StatusCode::from_u16(status)
            .ok()
            .filter(|code| code.is_client_error() || code.is_server_error())
            .unwrap_or(http::StatusCode::BAD_GATEWAY),
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Extract a human-readable diagnostic from an upstream error body.
///
/// Anthropic errors look like `{"type":"error","error":{"type":"...","message":"..."}}`.
/// Anything else falls back to the raw body text.
#[must_use]
pub(crate) fn upstream_diagnostic(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let error = json.get("error");
        if let Some(msg) = error
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
        {
            return truncate_diagnostic(msg);
        }
        if let Some(msg) = error.and_then(serde_json::Value::as_str) {
            return truncate_diagnostic(msg);
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "no response body".to_string();
    }
    truncate_diagnostic(text)
}

fn truncate_diagnostic(msg: &str) -> String {
    let truncated = truncate_on_char_boundary(msg, MAX_DIAGNOSTIC_LEN);
    if truncated.len() < msg.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

/// Format an error as `(status, {"error": message})`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let status = http_status_for_category(err.category());
    let body = serde_json::json!({ "error": err.to_string() });
    (status, body)
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

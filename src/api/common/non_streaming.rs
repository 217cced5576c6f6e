use std::time::Instant;

use axum::response::{IntoResponse, Response};

use crate::conversation::ConversationRequest;
use crate::error::RelayError;
use crate::observability::{log_relay_complete, RelayOutcome, RelayUsage};
use crate::protocol::anthropic::AnthropicMessageStart;
use crate::state::AppState;

/// Run a non-streaming completion and return the upstream JSON verbatim.
pub(crate) async fn handle_non_streaming_request(
    state: &AppState,
    conversation: &ConversationRequest,
    request_id: &str,
) -> Response {
    let started = Instant::now();
    match state.upstream.complete(conversation).await {
        Ok(body) => {
            log_relay_complete(
                request_id,
                &completion_usage(&body),
                RelayOutcome::Completed,
                1,
                started.elapsed(),
            );
            ok_json_response(body)
        }
        Err(err) => {
            if let RelayError::UpstreamRejected { status, .. } = &err {
                tracing::warn!(request_id, status = *status, error = %err, "upstream rejected request");
            } else {
                tracing::warn!(request_id, error = %err, "non-streaming completion failed");
            }
            err.into_response()
        }
    }
}

/// Model and token counts from a completion body, when it carries them.
fn completion_usage(body: &[u8]) -> RelayUsage {
    let mut usage = RelayUsage::default();
    if let Ok(message) = serde_json::from_slice::<AnthropicMessageStart>(body) {
        usage.model = message.model;
        if let Some(reported) = &message.usage {
            usage.merge(reported);
        }
    }
    usage
}

#[inline]
fn ok_json_response(body_bytes: bytes::Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

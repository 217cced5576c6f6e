use std::convert::Infallible;

use axum::body::Body;
use axum::response::Response;
use futures_util::StreamExt;

use crate::conversation::ConversationRequest;
use crate::error::RelayError;
use crate::protocol::NormalizedEvent;
use crate::state::AppState;
use crate::stream::relay_events;

/// Open the upstream stream and relay its events as an SSE body.
///
/// The response is always `200 text/event-stream`. When the upstream cannot
/// be opened the body carries a single `error` event.
pub(crate) async fn handle_streaming_request(
    state: &AppState,
    conversation: &ConversationRequest,
    request_id: String,
) -> Response {
    match state.upstream.open_stream(conversation).await {
        Ok(chunks) => {
            let events = relay_events(chunks, request_id)
                .map(|event| Ok::<_, Infallible>(event.to_sse_bytes()));
            sse_ok_response(Body::from_stream(events))
        }
        Err(err) => {
            log_open_failure(&request_id, &err);
            sse_ok_response(Body::from(
                NormalizedEvent::Error(err.to_string()).to_sse_bytes(),
            ))
        }
    }
}

fn log_open_failure(request_id: &str, err: &RelayError) {
    match err {
        RelayError::UpstreamRejected { status, .. } => tracing::warn!(
            request_id,
            status = *status,
            error = %err,
            "upstream rejected streaming request"
        ),
        _ => tracing::warn!(request_id, error = %err, "failed to open upstream stream"),
    }
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

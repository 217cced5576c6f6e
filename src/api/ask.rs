use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;

use crate::api::common::{handle_non_streaming_request, handle_streaming_request};
use crate::conversation::{ConversationRequest, Turn};
use crate::error::RelayError;
use crate::state::AppState;

/// Client request body for the ask endpoints.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl AskRequest {
    /// Parse and validate a request body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] for malformed JSON, a missing
    /// `question`, or a blank one.
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let request: AskRequest = serde_json::from_slice(body)
            .map_err(|err| RelayError::InvalidRequest(format!("Invalid JSON body: {err}")))?;
        if request.question.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        Ok(request)
    }
}

/// Handle `POST /ask` and `POST /api/ask`.
///
/// `default_stream` applies when the body has no `stream` field.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
    default_stream: bool,
) -> Response {
    let request = match AskRequest::parse(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let stream = request.stream.unwrap_or(default_stream);
    let conversation = ConversationRequest::build(&request.question, request.history);
    let request_id = state.next_request_id();

    tracing::info!(
        request_id = %request_id,
        turns = conversation.len(),
        stream,
        "ask request"
    );

    if stream {
        handle_streaming_request(&state, &conversation, request_id).await
    } else {
        handle_non_streaming_request(&state, &conversation, &request_id).await
    }
}

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::config::AppConfig;
use crate::conversation::ConversationRequest;
use crate::error::RelayError;
use crate::protocol::anthropic::{MessagesRequest, ThinkingConfig};
use crate::transport::{describe_reqwest_error, HttpTransport, IdleTimeout, PreparedUpstream};

/// Raw upstream body chunks, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Fixed per-process completion settings.
#[derive(Debug, Clone)]
struct CompletionSettings {
    model: String,
    max_tokens: u64,
    thinking: Option<ThinkingConfig>,
    system_prompt: String,
}

/// Client for the completion service, built once from configuration and
/// shared by all requests.
#[derive(Debug, Clone)]
pub struct UpstreamSession {
    transport: HttpTransport,
    prepared: PreparedUpstream,
    settings: CompletionSettings,
    idle_timeout: Duration,
    request_timeout: Duration,
}

impl UpstreamSession {
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] for an unusable endpoint or credential,
    /// or [`RelayError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, RelayError> {
        let upstream = &config.upstream;
        let settings = CompletionSettings {
            model: upstream.model.clone(),
            max_tokens: upstream.max_tokens,
            thinking: upstream
                .thinking_enabled
                .then(|| ThinkingConfig::enabled(upstream.thinking_budget_tokens)),
            system_prompt: upstream.system_prompt.clone(),
        };
        Ok(Self {
            transport: HttpTransport::new(&config.server)?,
            prepared: PreparedUpstream::new(upstream)?,
            settings,
            idle_timeout: Duration::from_secs(config.server.idle_timeout_secs),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Serialize the Messages API body for `conversation`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if serialization fails.
    pub fn request_body(
        &self,
        conversation: &ConversationRequest,
        stream: bool,
    ) -> Result<Bytes, RelayError> {
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: conversation.turns(),
            system: &self.settings.system_prompt,
            stream,
            thinking: self.settings.thinking,
        };
        serde_json::to_vec(&body)
            .map(Bytes::from)
            .map_err(|err| RelayError::Internal(format!("Failed to encode request: {err}")))
    }

    /// Open a streaming completion and return its body chunks.
    ///
    /// Waiting for response headers and for each later chunk is bounded by
    /// the idle timeout. Dropping the returned stream closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] when no response arrives and
    /// [`RelayError::UpstreamRejected`] for a non-success status.
    pub async fn open_stream(
        &self,
        conversation: &ConversationRequest,
    ) -> Result<ChunkStream, RelayError> {
        let body = self.request_body(conversation, true)?;
        let send = self.transport.post(
            self.prepared.messages_url(),
            self.prepared.headers(true),
            body,
            None,
        );
        let response = tokio::time::timeout(self.idle_timeout, send)
            .await
            .map_err(|_| {
                RelayError::UpstreamUnavailable(format!(
                    "Upstream did not respond within {}s",
                    self.idle_timeout.as_secs()
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.idle_timeout, response.bytes())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(RelayError::rejected(status, &body));
        }

        Ok(Box::pin(IdleTimeout::new(
            response.bytes_stream(),
            self.idle_timeout,
        )))
    }

    /// Run a non-streaming completion and return the upstream JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] on connect or read failure
    /// (including the request timeout) and [`RelayError::UpstreamRejected`]
    /// for a non-success status.
    pub async fn complete(&self, conversation: &ConversationRequest) -> Result<Bytes, RelayError> {
        let body = self.request_body(conversation, false)?;
        let response = self
            .transport
            .post(
                self.prepared.messages_url(),
                self.prepared.headers(false),
                body,
                Some(self.request_timeout),
            )
            .await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| RelayError::UpstreamUnavailable(describe_reqwest_error(&err)));
        if !status.is_success() {
            return Err(RelayError::rejected(status, &body.unwrap_or_default()));
        }
        body
    }
}

use crate::config::UpstreamConfig;
use crate::error::RelayError;

const MESSAGES_PATH: &str = "v1/messages";

/// Precomputed endpoint and headers for the completion service.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    messages_url: url::Url,
    json_headers: http::HeaderMap,
    stream_headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the base URL cannot be joined with
    /// the messages path or a header value is not representable.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let messages_url = messages_url(&upstream.base_url)?;
        let json_headers = build_provider_headers(upstream)?;
        let mut stream_headers = json_headers.clone();
        stream_headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("text/event-stream"),
        );
        Ok(Self {
            messages_url,
            json_headers,
            stream_headers,
        })
    }

    #[must_use]
    pub fn messages_url(&self) -> &url::Url {
        &self.messages_url
    }

    #[must_use]
    pub fn headers(&self, stream: bool) -> &http::HeaderMap {
        if stream {
            &self.stream_headers
        } else {
            &self.json_headers
        }
    }
}

fn messages_url(base_url: &str) -> Result<url::Url, RelayError> {
    let mut base = base_url.trim_end_matches('/').to_string();
    base.push('/');
    url::Url::parse(&base)
        .and_then(|base| base.join(MESSAGES_PATH))
        .map_err(|err| RelayError::Config(format!("Invalid upstream base_url '{base_url}': {err}")))
}

fn build_provider_headers(upstream: &UpstreamConfig) -> Result<http::HeaderMap, RelayError> {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );

    let mut api_key = http::HeaderValue::from_str(upstream.api_key.trim())
        .map_err(|_| RelayError::Config("upstream.api_key is not a valid header value".into()))?;
    api_key.set_sensitive(true);
    headers.insert("x-api-key", api_key);

    let version = http::HeaderValue::from_str(upstream.api_version.trim()).map_err(|_| {
        RelayError::Config("upstream.api_version is not a valid header value".into())
    })?;
    headers.insert("anthropic-version", version);

    Ok(headers)
}

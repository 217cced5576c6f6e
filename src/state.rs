use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::upstream::UpstreamSession;
use crate::util::format_request_seq_hex;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamSession,
    request_seq: AtomicU64,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, upstream: UpstreamSession) -> Self {
        Self {
            config,
            upstream,
            request_seq: AtomicU64::new(1),
        }
    }

    /// Build state and the upstream session from configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamSession::new`] failures.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let upstream = UpstreamSession::new(&config)?;
        Ok(Self::new(config, upstream))
    }

    /// Next request sequence number. Used only to correlate log lines.
    pub fn next_request_seq(&self) -> u64 {
        self.request_seq.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        format_request_seq_hex("req-", self.next_request_seq())
    }
}

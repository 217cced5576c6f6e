use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::anthropic::AnthropicUsage;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(tracing_level(&level)).unwrap_or_else(|_| EnvFilter::new("INFO"))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Token usage and model reported by the upstream during one relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayUsage {
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl RelayUsage {
    /// Fold in an upstream usage block. Upstream counts are cumulative, so
    /// later non-empty values replace earlier ones.
    pub fn merge(&mut self, usage: &AnthropicUsage) {
        if let Some(input) = usage.input_tokens {
            self.input_tokens = Some(input);
        }
        if let Some(output) = usage.output_tokens {
            self.output_tokens = Some(output);
        }
    }
}

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    UpstreamError,
    ClientDisconnected,
}

impl RelayOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::UpstreamError => "upstream_error",
            RelayOutcome::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Log token usage for a finished relay at INFO level.
pub fn log_relay_complete(
    request_id: &str,
    usage: &RelayUsage,
    outcome: RelayOutcome,
    events: u64,
    duration: Duration,
) {
    info!(
        request_id = request_id,
        model = usage.model.as_deref().unwrap_or("unknown"),
        input_tokens = usage.input_tokens.unwrap_or(0),
        output_tokens = usage.output_tokens.unwrap_or(0),
        events = events,
        outcome = outcome.as_str(),
        duration_seconds = duration.as_secs_f64(),
        "relay finished"
    );
}

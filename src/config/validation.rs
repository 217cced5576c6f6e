use super::{AppConfig, ConfigError};

/// Smallest thinking budget the completion service accepts.
pub const MIN_THINKING_BUDGET_TOKENS: u64 = 1024;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    for (name, value) in [
        ("server.connect_timeout_secs", server.connect_timeout_secs),
        ("server.idle_timeout_secs", server.idle_timeout_secs),
        ("server.request_timeout_secs", server.request_timeout_secs),
    ] {
        if value == 0 {
            return Err(validation_err(format!("{name} must be greater than 0")));
        }
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if server.cors_allow_origin.trim().is_empty() {
        return Err(validation_err("server.cors_allow_origin cannot be empty"));
    }
    if http::HeaderValue::from_str(&server.cors_allow_origin).is_err() {
        return Err(validation_err(
            "server.cors_allow_origin is not a valid header value",
        ));
    }
    Ok(())
}

fn validate_upstream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;

    let parsed = url::Url::parse(&upstream.base_url).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }

    if upstream.api_key.trim().is_empty() {
        return Err(validation_err(
            "upstream.api_key cannot be empty (set it in the config file or CLAUDE_API_KEY)",
        ));
    }
    if http::HeaderValue::from_str(&upstream.api_key).is_err() {
        return Err(validation_err(
            "upstream.api_key contains characters not allowed in a header",
        ));
    }
    if upstream.api_version.trim().is_empty() {
        return Err(validation_err("upstream.api_version cannot be empty"));
    }
    if upstream.model.trim().is_empty() {
        return Err(validation_err("upstream.model cannot be empty"));
    }
    if upstream.max_tokens == 0 {
        return Err(validation_err("upstream.max_tokens must be greater than 0"));
    }
    if upstream.thinking_enabled {
        if upstream.thinking_budget_tokens < MIN_THINKING_BUDGET_TOKENS {
            return Err(validation_err(format!(
                "upstream.thinking_budget_tokens must be at least {MIN_THINKING_BUDGET_TOKENS}"
            )));
        }
        if upstream.thinking_budget_tokens >= upstream.max_tokens {
            return Err(validation_err(
                "upstream.thinking_budget_tokens must be less than upstream.max_tokens",
            ));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

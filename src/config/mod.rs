pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "ARLO_CONFIG";
pub const API_KEY_ENV: &str = "CLAUDE_API_KEY";
pub const PORT_ENV: &str = "PORT";

const DEFAULT_SYSTEM_PROMPT: &str = "You are Arlo, a helpful coding assistant with extended thinking capabilities. Provide detailed, accurate responses to programming questions. I prefer complete code I can copy and paste. I want exact answers, nothing made up. I want enterprise patterns that protect against all vulnerabilities. I always want correct error handling and semantic comments with usage examples.";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid environment override {name}: {reason}")]
    Env { name: &'static str, reason: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on the wait for each upstream chunk while streaming.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Upper bound on a whole non-streaming upstream call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_static_dir() -> String {
    "public".to_string()
}
fn default_cors_allow_origin() -> String {
    "*".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    120
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            static_dir: default_static_dir(),
            cors_allow_origin: default_cors_allow_origin(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
        }
    }
}

/// Completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_true")]
    pub thinking_enabled: bool,
    #[serde(default = "default_thinking_budget_tokens")]
    pub thinking_budget_tokens: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}
fn default_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}
fn default_max_tokens() -> u64 {
    20_000
}
fn default_true() -> bool {
    true
}
fn default_thinking_budget_tokens() -> u64 {
    16_000
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_version: default_api_version(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            thinking_enabled: true,
            thinking_budget_tokens: default_thinking_budget_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply environment overrides, and validate.
///
/// A missing file is not an error: every field has a default and the API key
/// usually arrives through `CLAUDE_API_KEY`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails for any reason other
/// than absence, [`ConfigError::Yaml`] when parsing fails, [`ConfigError::Env`]
/// for malformed overrides, or [`ConfigError::Validation`] when semantic
/// validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: &str, env: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => AppConfig::default(),
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;
    Ok(config)
}

/// Apply `CLAUDE_API_KEY` and `PORT` on top of file configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] when `PORT` is not a valid port number.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env(API_KEY_ENV).filter(|key| !key.trim().is_empty()) {
        config.upstream.api_key = key.trim().to_string();
    }
    if let Some(port) = env(PORT_ENV) {
        config.server.port = port.trim().parse().map_err(|err| ConfigError::Env {
            name: PORT_ENV,
            reason: format!("{err}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_example_config() {
        let config = load_config_with_env("config.example.yaml", no_env);
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.static_dir, "public");
        assert_eq!(config.upstream.api_version, "2023-06-01");
        assert!(config.upstream.thinking_enabled);
        assert!(config.upstream.thinking_budget_tokens < config.upstream.max_tokens);
    }

    #[test]
    fn test_missing_file_uses_defaults_and_env_key() {
        let config = load_config_with_env("does-not-exist.yaml", |name| match name {
            API_KEY_ENV => Some("sk-ant-env".to_string()),
            _ => None,
        })
        .expect("defaults with env key should validate");
        assert_eq!(config.upstream.api_key, "sk-ant-env");
        assert_eq!(config.upstream.model, "claude-3-7-sonnet-20250219");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_missing_file_without_key_is_invalid() {
        let err = load_config_with_env("does-not-exist.yaml", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_port_override() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |name| match name {
            PORT_ENV => Some("8080".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, |name| match name {
            PORT_ENV => Some("eighty".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: PORT_ENV, .. }));
    }

    #[test]
    fn test_blank_env_key_does_not_clobber_file_key() {
        let mut config = AppConfig::default();
        config.upstream.api_key = "from-file".to_string();
        apply_env_overrides(&mut config, |name| match name {
            API_KEY_ENV => Some("   ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.upstream.api_key, "from-file");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: AppConfig =
            serde_yaml::from_str("upstream:\n  api_key: k\n  max_tokens: 4000\n").unwrap();
        assert_eq!(config.upstream.max_tokens, 4000);
        assert_eq!(config.upstream.thinking_budget_tokens, 16_000);
        assert_eq!(config.server.idle_timeout_secs, 120);
        assert_eq!(config.features.log_level, "INFO");
    }
}

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary that leaves out the API key.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "arlo-relay is running",
        "config": {
            "model": state.upstream.model(),
            "api_version": config.upstream.api_version,
            "max_tokens": config.upstream.max_tokens,
            "thinking_enabled": config.upstream.thinking_enabled,
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}

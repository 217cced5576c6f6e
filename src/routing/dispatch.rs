use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{ask, assets, health};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;
const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "content-type, authorization";

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Ask { default_stream: bool },
    Landing,
    Health,
    Asset { path: &'a str },
    Preflight,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response carries the configured `access-control-allow-origin`.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let mut response = match route {
        RouteMatch::Ask { default_stream } => match read_request_body(body).await {
            Ok(body_bytes) => ask::handler(State(Arc::clone(&state)), body_bytes, default_stream).await,
            Err(response) => response,
        },
        RouteMatch::Landing => assets::landing_handler(&state).await,
        RouteMatch::Health => health::health_handler(State(Arc::clone(&state))).into_response(),
        RouteMatch::Asset { path } => assets::asset_handler(&state, path).await,
        RouteMatch::Preflight => preflight_response(),
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    apply_cors_origin(&mut response, &state.config.server.cors_allow_origin);
    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                axum::Json(serde_json::json!({ "error": "Request body too large (max 2MiB)" })),
            )
                .into_response()
        })
}

fn match_route<'a>(method: &Method, path: &'a str) -> RouteMatch<'a> {
    if method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }

    match path {
        "/ask" | "/api/ask" => {
            if method == Method::POST {
                RouteMatch::Ask {
                    default_stream: path == "/ask",
                }
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/health" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/" => {
            if method == Method::GET {
                RouteMatch::Landing
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => {
            if method == Method::GET {
                RouteMatch::Asset { path }
            } else {
                RouteMatch::NotFound
            }
        }
    }
}

fn preflight_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        http::HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        http::HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}

fn apply_cors_origin(response: &mut Response, origin: &str) {
    // Checked at config load; a bad value just leaves the header off.
    if let Ok(value) = http::HeaderValue::from_str(origin) {
        response
            .headers_mut()
            .insert(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
}

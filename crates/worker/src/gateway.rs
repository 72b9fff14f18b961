//! HTTP front door for the worker.
//!
//! The gateway renders incoming HTTP requests into the worker's request
//! model and hands them to the event loop. Request metadata comes from
//! the fetch-metadata headers browsers attach (`Sec-Fetch-Dest`,
//! `Sec-Fetch-Mode`); for clients that send neither, the destination is
//! guessed from the path extension and the Accept header.
//!
//! Control-channel operations live under `/_worker/` outside the proxied
//! namespace: skip-waiting, version, and lifecycle state.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cachette_client::fetch::url::{UrlError, join_origin};
use cachette_core::{Destination, RequestInfo, RequestMode};
use url::Url;

use crate::control::WorkerHandle;
use crate::error::WorkerError;
use crate::worker::{Outcome, ServedResponse};

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub handle: WorkerHandle,
    pub origin: Url,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/_worker/version", get(version))
        .route("/_worker/state", get(lifecycle_state))
        .route("/_worker/skip-waiting", post(skip_waiting))
        .fallback(intercept)
        .with_state(state)
}

async fn version(State(state): State<GatewayState>) -> Response {
    match state.handle.version().await {
        Ok(version) => Json(serde_json::json!({ "version": version })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn lifecycle_state(State(state): State<GatewayState>) -> Response {
    match state.handle.state().await {
        Ok(s) => Json(serde_json::json!({ "state": s.as_str() })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn skip_waiting(State(state): State<GatewayState>) -> Response {
    match state.handle.skip_waiting().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn intercept(State(state): State<GatewayState>, req: Request) -> Response {
    let request = match request_from_parts(&state.origin, req.method(), req.uri(), req.headers()) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.handle.fetch(request).await {
        Ok(Outcome::Response(served)) => into_response(served),
        Ok(Outcome::Ignored) => (StatusCode::BAD_REQUEST, "unsupported scheme").into_response(),
        Err(e) => error_response(&e),
    }
}

/// Render an incoming HTTP request into the worker's request model.
pub fn request_from_parts(
    origin: &Url, method: &Method, uri: &Uri, headers: &HeaderMap,
) -> Result<RequestInfo, UrlError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = join_origin(origin, path_and_query)?;

    let destination = derive_destination(headers, url.path());
    let mode = derive_mode(headers, destination);

    Ok(RequestInfo { method: method.as_str().to_uppercase(), url, destination, mode })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn derive_destination(headers: &HeaderMap, path: &str) -> Destination {
    if let Some(token) = header_str(headers, "sec-fetch-dest") {
        return Destination::from_token(token);
    }
    if let Some(dest) = destination_from_extension(path) {
        return dest;
    }
    let accepts_html = header_str(headers, header::ACCEPT.as_str())
        .is_some_and(|accept| accept.contains("text/html"));
    if accepts_html { Destination::Document } else { Destination::Other }
}

fn derive_mode(headers: &HeaderMap, destination: Destination) -> RequestMode {
    match header_str(headers, "sec-fetch-mode") {
        Some("navigate") => RequestMode::Navigate,
        Some(_) => RequestMode::Other,
        None if destination == Destination::Document => RequestMode::Navigate,
        None => RequestMode::Other,
    }
}

fn destination_from_extension(path: &str) -> Option<Destination> {
    let extension = path.rsplit('/').next()?.rsplit_once('.')?.1;
    match extension.to_ascii_lowercase().as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" => Some(Destination::Image),
        "css" => Some(Destination::Style),
        "js" | "mjs" => Some(Destination::Script),
        "html" | "htm" => Some(Destination::Document),
        _ => None,
    }
}

fn into_response(served: ServedResponse) -> Response {
    let status = StatusCode::from_u16(served.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    headers.insert("x-cachette-source", HeaderValue::from_static(served.source.as_str()));
    if let Some(content_type) = &served.content_type
        && let Ok(value) = HeaderValue::from_str(content_type)
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    (status, headers, served.body).into_response()
}

fn error_response(err: &WorkerError) -> Response {
    let status = match err {
        WorkerError::NotActive { .. } => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Fetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::debug!(error = %err, status = status.as_u16(), "request failed");
    (status, err.to_string()).into_response()
}

use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use mercure_protocol::HubError;
use tower_http::trace::TraceLayer;

use crate::publish;
use crate::state::AppState;
use crate::subscribe;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/.well-known/mercure",
            get(subscribe::subscribe).post(publish::publish),
        )
        .fallback(fallback_404)
        .layer(middleware::from_fn(normalize_error_responses))
        .layer(middleware::from_fn(negotiate_error_response))
        .layer(middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_404() -> Response {
    HubError::NotFound.into_response()
}

/// Rewrites axum's default empty 404/405 bodies (from unmatched routes or
/// unmatched methods on a matched route) into the hub's JSON error
/// envelope, preserving any `Allow` header axum already attached.
async fn normalize_error_responses(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            let allowed = response
                .headers()
                .get(header::ALLOW)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').map(|s| s.trim().to_owned()).collect())
                .unwrap_or_default();
            HubError::MethodNotAllowed { allowed }.into_response()
        }
        StatusCode::NOT_FOUND if response.headers().get(header::CONTENT_TYPE).is_none() => {
            HubError::NotFound.into_response()
        }
        _ => response,
    }
}

/// Renegotiates an error response's body against the request's `Accept`
/// header: `application/json` (the default, including no `Accept` header at
/// all) keeps the `{code,message,details}` envelope; anything else gets the
/// bare message as `text/plain`.
async fn negotiate_error_response(request: Request, next: Next) -> Response {
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let response = next.run(request).await;
    if !response.status().is_client_error() && !response.status().is_server_error() {
        return response;
    }
    if wants_json(accept.as_deref()) {
        return response;
    }

    let status = response.status();
    let mut headers = response.headers().clone();
    let message = match to_bytes(response.into_body(), usize::MAX).await {
        Ok(body) => serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned()),
        Err(_) => status.canonical_reason().unwrap_or("error").to_owned(),
    };

    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    let mut plain = (status, message).into_response();
    *plain.headers_mut() = headers;
    plain.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    plain
}

fn wants_json(accept: Option<&str>) -> bool {
    match accept {
        None => true,
        Some(accept) => accept
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim())
            .any(|media| media == "application/json" || media == "application/*" || media == "*/*"),
    }
}

async fn add_security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("same-origin"));
    headers.insert(header::SERVER, HeaderValue::from_static("mercure-hub"));
    response
}

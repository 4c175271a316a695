use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

pub const HTTPS_ONLY_DESCRIPTION: &str = "do yourself a favor and only use https";

/// Interaction pages must never be served from a cache.
pub async fn no_cache(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    res
}

pub async fn log_requests(req: Request, next: Next) -> Response {
    debug!(method = %req.method(), path = %req.uri().path(), "http.request");
    next.run(req).await
}

/// Behind a TLS-terminating proxy: the first `X-Forwarded-Proto` entry must be https.
fn forwarded_https(req: &Request) -> bool {
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|p| p.trim().eq_ignore_ascii_case("https"))
}

pub async fn require_https(req: Request, next: Next) -> Response {
    if forwarded_https(&req) {
        return next.run(req).await;
    }
    match *req.method() {
        Method::GET | Method::HEAD => {
            let host = req
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            let path = req.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
            let location = format!("https://{host}{path}");
            debug!(%location, "http.upgrade_redirect");
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request", "error_description": HTTPS_ONLY_DESCRIPTION})),
        )
            .into_response(),
    }
}

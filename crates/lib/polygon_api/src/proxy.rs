//! Forwarding of `/v1/{service}/...` to configured upstreams.
//!
//! Mounted as the router fallback, so it runs behind the gateway middleware
//! and forwards the trust headers it inserted.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::Response;
use tracing::debug;
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Largest request body the proxy buffers.
pub const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

/// Service name from `/v1/{service}/...`.
pub fn service_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/v1/")?;
    let service = rest.split('/').next()?;
    (!service.is_empty()).then_some(service)
}

fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}

fn target_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut target = base.clone();
    target.set_path(&format!("{}{}", base.path().trim_end_matches('/'), path));
    target.set_query(query);
    target
}

/// Router fallback forwarding to the upstream named by the path.
pub async fn forward(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    let base = service_of(path)
        .and_then(|service| state.config.upstreams.get(service))
        .ok_or_else(|| AppError::NotFound(format!("no route for {path}")))?;
    let target = target_url(base, path, parts.uri.query());

    let body = to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| AppError::PayloadTooLarge(format!("request body: {e}")))?;

    let mut headers = without_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);

    debug!(method = %parts.method, %target, "proxying request");
    let upstream = state
        .http
        .request(parts.method.clone(), target.clone())
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::BadGateway(format!("{target}: {e}")))?;

    let status = upstream.status();
    let headers = without_hop_by_hop(upstream.headers());
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::BadGateway(format!("{target}: {e}")))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

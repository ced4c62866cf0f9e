use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Url;
use serde_json::json;
use tracing::warn;

use crate::AppState;

const MAX_PROXY_BODY_BYTES: usize = 10 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn copy_headers(source: &HeaderMap, target: &mut HeaderMap) {
    for (name, value) in source {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        target.append(name.clone(), value.clone());
    }
}

/// Join the request target onto the upstream base. Returns `None` when the
/// resulting URL would not carry exactly the request's path, for instance
/// because the URL parser resolved a dot segment the gate never saw.
fn upstream_url(base: &str, target: &Uri) -> Option<Url> {
    let mut url = Url::parse(base).ok()?;
    let path = format!("{}{}", url.path().trim_end_matches('/'), target.path());
    url.set_path(&path);
    url.set_query(target.query());
    (url.path() == path).then_some(url)
}

fn bad_gateway(message: &str) -> Response {
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": message }))).into_response()
}

/// Forward a request the gate admitted to the storefront upstream.
pub async fn forward(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(upstream) = state.config.upstream_url.as_deref() else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response();
    };

    let (parts, body) = request.into_parts();
    let Some(url) = upstream_url(upstream, &parts.uri) else {
        warn!(upstream, uri = %parts.uri, "Request target does not map onto the upstream");
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid request path" })))
            .into_response();
    };

    let body = match to_bytes(body, MAX_PROXY_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to buffer request body for upstream");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let mut outbound = HeaderMap::new();
    copy_headers(&parts.headers, &mut outbound);

    let upstream_response = match state
        .http_client
        .request(parts.method, url.clone())
        .headers(outbound)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, url = %url, "Upstream request failed");
            return bad_gateway("Upstream unavailable");
        }
    };

    let status = upstream_response.status();
    let mut headers = HeaderMap::new();
    copy_headers(upstream_response.headers(), &mut headers);
    let bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, url = %url, "Failed to read upstream response");
            return bad_gateway("Upstream response unreadable");
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

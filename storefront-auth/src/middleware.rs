use axum::body::Body;
use axum::extract::State;
use axum::http::header::LOCATION;
use axum::http::uri::{PathAndQuery, Uri};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_auth::{canonical_path, inject_context_headers, strip_context_headers, GateDecision};
use tracing::{debug, warn};

use crate::AppState;

/// Runs the authorization gate in front of everything downstream. Context
/// headers sent by the client are always discarded; verified context is
/// re-injected both as headers and as a `Principal` request extension.
pub async fn gate_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    strip_context_headers(request.headers_mut());
    if let Err(uri) = canonicalize_uri(&mut request) {
        warn!(uri = %uri, "Rejecting request path that cannot be canonicalized");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let cookies = state.cookies.read(request.headers());
    let outcome = state.gate.evaluate(request.uri().path(), &cookies);

    match outcome.decision {
        GateDecision::Forward { principal } => {
            let label = if principal.is_some() { "forward_authenticated" } else { "forward" };
            state.metrics.gate_decision(outcome.class.as_str(), label);

            if let Some(principal) = principal {
                inject_context_headers(request.headers_mut(), &principal);
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        GateDecision::Redirect { location } => {
            state.metrics.gate_decision(outcome.class.as_str(), "redirect");
            debug!(path = %outcome.path, location = %location, "Redirecting unauthenticated request");
            (StatusCode::FOUND, [(LOCATION, location)]).into_response()
        }
    }
}

/// Rewrite the request target to its dot-free form so the gate and every
/// downstream handler see the same path.
fn canonicalize_uri(request: &mut Request<Body>) -> Result<(), Uri> {
    let uri = request.uri();
    let path = canonical_path(uri.path());
    if path == uri.path() {
        return Ok(());
    }

    let target = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(target).map_err(|_| uri.clone())?);
    let rewritten = Uri::from_parts(parts).map_err(|_| uri.clone())?;
    debug!(from = %uri, to = %rewritten, "Canonicalized request path");
    *request.uri_mut() = rewritten;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonicalized(target: &str) -> String {
        let mut request = Request::builder().uri(target).body(Body::empty()).unwrap();
        canonicalize_uri(&mut request).unwrap();
        request.uri().to_string()
    }

    #[test]
    fn rewrites_dot_segments_and_keeps_the_query() {
        assert_eq!(
            canonicalized("/admin/login/../dashboard?tab=1"),
            "/admin/dashboard?tab=1"
        );
        assert_eq!(canonicalized("/gangnam/%2e/products"), "/gangnam/products");
    }

    #[test]
    fn leaves_clean_paths_alone() {
        assert_eq!(canonicalized("/gangnam/products?page=2"), "/gangnam/products?page=2");
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Path;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common_auth::{
    ensure_branch_scope, ensure_org_admin, AdminSession, CodecConfig, JwtCodec, Session,
    TokenSecret,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use storefront_auth::config::AuthConfig;
use storefront_auth::identity::{ExternalIdentity, IdentityError, IdentityExchange, IdentityProviders};
use storefront_auth::metrics::AuthMetrics;
use storefront_auth::store::{AdminRecord, BranchRecord, CustomerRecord, InMemoryPrincipalStore};
use storefront_auth::{build_router, build_router_with, AppState};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const ADMIN_PASSWORD: &str = "admin-pass-1";
pub const CUSTOMER_PASSWORD: &str = "customer-pass-1";

pub fn codec_config() -> CodecConfig {
    CodecConfig::new(
        TokenSecret::new("integration-access-secret").unwrap(),
        TokenSecret::new("integration-refresh-secret").unwrap(),
    )
}

pub fn test_config() -> AuthConfig {
    AuthConfig::new(codec_config())
}

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryPrincipalStore,
    pub codec: JwtCodec,
    pub gangnam: BranchRecord,
    pub org_admin: AdminRecord,
    pub branch_admin: AdminRecord,
    pub customer: CustomerRecord,
}

/// Pretends to be a provider that always verifies the code it is given.
pub struct StubExchange;

#[async_trait]
impl IdentityExchange for StubExchange {
    async fn exchange(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<ExternalIdentity, IdentityError> {
        if code == "bad-code" {
            return Err(IdentityError::Rejected("invalid grant".into()));
        }
        Ok(ExternalIdentity {
            provider: "kakao".into(),
            subject: code.to_string(),
            email: None,
            display_name: Some("카카오 사용자".into()),
        })
    }
}

fn hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: AuthConfig) -> TestApp {
    spawn(config, |state| build_router_with(state, downstream())).await
}

/// The production router, proxying admitted requests to `upstream_url`.
pub async fn spawn_proxied_app(upstream_url: String) -> TestApp {
    let mut config = test_config();
    config.upstream_url = Some(upstream_url);
    spawn(config, build_router).await
}

async fn spawn(config: AuthConfig, router: impl FnOnce(AppState) -> Router) -> TestApp {
    let store = InMemoryPrincipalStore::new();

    let gangnam = BranchRecord {
        id: Uuid::new_v4(),
        slug: "gangnam".into(),
        name: "Gangnam".into(),
    };
    store.upsert_branch(gangnam.clone()).await;

    let org_admin = AdminRecord {
        id: Uuid::new_v4(),
        username: "hq".into(),
        name: "Head Office".into(),
        role: "org_admin".into(),
        branch_id: None,
        password_hash: hash(ADMIN_PASSWORD),
    };
    let branch_admin = AdminRecord {
        id: Uuid::new_v4(),
        username: "gangnam-owner".into(),
        name: "Gangnam Owner".into(),
        role: "branch_admin".into(),
        branch_id: Some(gangnam.id),
        password_hash: hash(ADMIN_PASSWORD),
    };
    let customer = CustomerRecord {
        id: Uuid::new_v4(),
        email: "mom@example.com".into(),
        name: Some("Mom".into()),
        phone: None,
        branch_id: Some(gangnam.id),
        password_hash: Some(hash(CUSTOMER_PASSWORD)),
    };
    store.upsert_admin(org_admin.clone()).await;
    store.upsert_admin(branch_admin.clone()).await;
    store.upsert_customer(customer.clone()).await;

    let identity = IdentityProviders::new().register("kakao", Arc::new(StubExchange));
    let codec = JwtCodec::new(config.codec.clone());
    let state = AppState::new(
        config,
        Arc::new(store.clone()),
        identity,
        AuthMetrics::new().unwrap(),
        reqwest::Client::new(),
    );

    TestApp {
        router: router(state),
        store,
        codec,
        gangnam,
        org_admin,
        branch_admin,
        customer,
    }
}

/// Stand-in for the storefront application behind the gate.
fn downstream() -> Router<AppState> {
    Router::new()
        .route("/admin/organization/reports", get(org_reports))
        .route("/admin/branches/:branch_id/settings", post(update_branch_settings))
        .route("/api/echo", get(echo_context))
        .route("/:branch/products", get(echo_context))
        .fallback(|| async { "page" })
}

async fn org_reports(AdminSession(admin): AdminSession) -> Response {
    match ensure_org_admin(&admin) {
        Ok(()) => Json(json!({ "reports": [] })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_branch_settings(
    AdminSession(admin): AdminSession,
    Path(branch_id): Path<Uuid>,
) -> Response {
    match ensure_branch_scope(&admin, branch_id) {
        Ok(()) => Json(json!({ "updated": branch_id })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn echo_context(headers: HeaderMap, session: Option<Session>) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "userType": header("x-user-type"),
        "adminId": header("x-admin-id"),
        "customerId": header("x-customer-id"),
        "customerEmail": header("x-customer-email"),
        "customerName": header("x-customer-name"),
        "sessionSubject": session.map(|session| session.principal.subject_id()),
    }))
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookies: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookie_header(cookies));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookies: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookie_header(cookies));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

pub fn cookie_header(cookies: &[(&str, &str)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

/// Value of the named cookie in the response's Set-Cookie headers.
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?.to_string();
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn assert_redirect(response: &Response, expected: &str) {
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(response).as_deref(), Some(expected));
}

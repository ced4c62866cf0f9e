mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common_auth::{AccessClaims, Principal, TokenCodec};
use httpmock::prelude::*;
use support::{assert_redirect, json_body, spawn_app, spawn_proxied_app};

#[tokio::test]
async fn anonymous_admin_request_is_sent_to_admin_login() {
    let app = spawn_app().await;

    let response = app.get("/admin/dashboard", &[]).await;
    assert_redirect(&response, "/admin/login");
}

#[tokio::test]
async fn anonymous_tenant_request_keeps_the_original_path() {
    let app = spawn_app().await;

    let response = app.get("/gangnam/mypage", &[]).await;
    assert_redirect(&response, "/gangnam/login?redirect=%2Fgangnam%2Fmypage");
}

#[tokio::test]
async fn login_pages_and_assets_are_public() {
    let app = spawn_app().await;

    for path in [
        "/gangnam/login",
        "/gangnam/signup",
        "/admin/login",
        "/",
        "/favicon.ico",
        "/images/logo.png",
    ] {
        let response = app.get(path, &[]).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn dot_segments_do_not_escape_into_protected_routes() {
    let app = spawn_app().await;

    for path in [
        "/admin/login/../dashboard",
        "/admin/login/%2e%2e/dashboard",
        "/admin/login/.%2E/dashboard",
        "/_next/static/../admin/x",
        "/api/../admin/orders",
    ] {
        let response = app.get(path, &[]).await;
        assert_redirect(&response, "/admin/login");
    }

    let response = app.get("/gangnam/login/../mypage", &[]).await;
    assert_redirect(&response, "/gangnam/login?redirect=%2Fgangnam%2Fmypage");
}

#[tokio::test]
async fn proxy_sends_the_path_the_gate_classified() {
    let upstream = MockServer::start_async().await;
    let products = upstream
        .mock_async(|when, then| {
            when.method(GET)
                .path("/gangnam/products")
                .query_param("page", "2")
                .header("x-user-type", "customer");
            then.status(200).body("products");
        })
        .await;
    let dashboard = upstream
        .mock_async(|when, then| {
            when.path("/admin/dashboard");
            then.status(200).body("dashboard");
        })
        .await;

    let app = spawn_proxied_app(upstream.base_url()).await;
    let principal = Principal::Customer(app.customer.to_principal());
    let token = app.codec.sign_access(&principal).unwrap();

    let response = app
        .get(
            "/gangnam/login/../products?page=2",
            &[("customer_access_token", token.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    products.assert_async().await;

    let response = app.get("/admin/login/%2e%2e/dashboard", &[]).await;
    assert_redirect(&response, "/admin/login");
    dashboard.assert_hits_async(0).await;
}

#[tokio::test]
async fn customer_token_forwards_with_context() {
    let app = spawn_app().await;
    let principal = Principal::Customer(app.customer.to_principal());
    let token = app.codec.sign_access(&principal).unwrap();

    let response = app
        .get("/gangnam/products", &[("customer_access_token", token.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["userType"], "customer");
    assert_eq!(body["customerId"], app.customer.id.to_string());
    assert_eq!(body["customerEmail"], "mom%40example.com");
    assert_eq!(body["sessionSubject"], app.customer.id.to_string());
}

#[tokio::test]
async fn admin_token_opens_admin_pages() {
    let app = spawn_app().await;
    let principal = Principal::Admin(app.org_admin.to_principal().unwrap());
    let token = app.codec.sign_access(&principal).unwrap();

    let response = app
        .get("/admin/dashboard", &[("admin_access_token", token.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tokens_never_cross_principal_kinds() {
    let app = spawn_app().await;
    let customer = Principal::Customer(app.customer.to_principal());
    let admin = Principal::Admin(app.org_admin.to_principal().unwrap());
    let customer_token = app.codec.sign_access(&customer).unwrap();
    let admin_token = app.codec.sign_access(&admin).unwrap();

    let response = app
        .get("/admin/dashboard", &[("customer_access_token", customer_token.as_str())])
        .await;
    assert_redirect(&response, "/admin/login");

    // A customer token planted in the admin slot still fails verification.
    let response = app
        .get("/admin/dashboard", &[("admin_access_token", customer_token.as_str())])
        .await;
    assert_redirect(&response, "/admin/login");

    let response = app
        .get("/gangnam/products", &[("customer_access_token", admin_token.as_str())])
        .await;
    assert_redirect(&response, "/gangnam/login?redirect=%2Fgangnam%2Fproducts");
}

#[tokio::test]
async fn expired_access_token_redirects() {
    let app = spawn_app().await;
    let principal = Principal::Admin(app.org_admin.to_principal().unwrap());
    let claims = AccessClaims::issue(
        principal,
        app.codec.config(),
        Utc::now() - Duration::minutes(16),
    );
    let token = app.codec.encode_access(&claims).unwrap();

    let response = app
        .get("/admin/dashboard", &[("admin_access_token", token.as_str())])
        .await;
    assert_redirect(&response, "/admin/login");
}

#[tokio::test]
async fn tampered_token_redirects() {
    let app = spawn_app().await;
    let principal = Principal::Customer(app.customer.to_principal());
    let token = app.codec.sign_access(&principal).unwrap();
    let index = token.len() - 10;
    let replacement = if &token[index..=index] == "A" { "B" } else { "A" };
    let token = format!("{}{}{}", &token[..index], replacement, &token[index + 1..]);

    let response = app
        .get("/gangnam/products", &[("customer_access_token", token.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn spoofed_context_headers_are_discarded() {
    let app = spawn_app().await;

    let request = Request::builder()
        .uri("/api/echo")
        .header("x-user-type", "admin")
        .header("x-admin-id", "00000000-0000-0000-0000-000000000001")
        .header("x-admin-role", "org_admin")
        .body(Body::empty())
        .unwrap();
    let body = json_body(app.send(request).await).await;
    assert!(body["userType"].is_null());
    assert!(body["adminId"].is_null());
    assert!(body["sessionSubject"].is_null());
}

#[tokio::test]
async fn spoofed_headers_are_replaced_by_verified_context() {
    let app = spawn_app().await;
    let principal = Principal::Customer(app.customer.to_principal());
    let token = app.codec.sign_access(&principal).unwrap();

    let request = Request::builder()
        .uri("/gangnam/products")
        .header("cookie", format!("customer_access_token={token}"))
        .header("x-customer-id", "00000000-0000-0000-0000-000000000002")
        .body(Body::empty())
        .unwrap();
    let body = json_body(app.send(request).await).await;
    assert_eq!(body["customerId"], app.customer.id.to_string());
}

#[tokio::test]
async fn branch_admin_passes_the_gate_but_not_the_org_guard() {
    let app = spawn_app().await;
    let principal = Principal::Admin(app.branch_admin.to_principal().unwrap());
    let token = app.codec.sign_access(&principal).unwrap();

    let response = app
        .get("/admin/organization/reports", &[("admin_access_token", token.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn org_admin_passes_the_org_guard() {
    let app = spawn_app().await;
    let principal = Principal::Admin(app.org_admin.to_principal().unwrap());
    let token = app.codec.sign_access(&principal).unwrap();

    let response = app
        .get("/admin/organization/reports", &[("admin_access_token", token.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn branch_scope_is_enforced_downstream() {
    let app = spawn_app().await;
    let principal = Principal::Admin(app.branch_admin.to_principal().unwrap());
    let token = app.codec.sign_access(&principal).unwrap();
    let cookie = format!("admin_access_token={token}");

    let own = Request::builder()
        .method("POST")
        .uri(format!("/admin/branches/{}/settings", app.gangnam.id))
        .header("cookie", cookie.as_str())
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(own).await.status(), StatusCode::OK);

    let other = Request::builder()
        .method("POST")
        .uri(format!("/admin/branches/{}/settings", uuid::Uuid::new_v4()))
        .header("cookie", cookie.as_str())
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(other).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn auth_api_and_health_are_not_gated() {
    let app = spawn_app().await;

    let response = app.get("/healthz", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/auth/debug", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn gate_decisions_show_up_in_metrics() {
    let app = spawn_app().await;
    app.get("/admin/dashboard", &[]).await;

    let response = app.get("/metrics", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("redirect"));
}

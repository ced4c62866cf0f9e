use axum::extract::{Path, Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use common_auth::{decode_unverified, Principal, PrincipalKind, SessionCookieStore, TokenCodec};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::authn::{IssuedSession, SignupError, SignupRequest};
use crate::identity::{customer_landing, CallbackState};
use crate::AppState;

const INVALID_TYPE_MESSAGE: &str = "Invalid type. Must be \"admin\" or \"customer\"";
const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh token";

impl IntoResponse for SignupError {
    fn into_response(self) -> Response {
        match self {
            SignupError::InvalidInput(message) => error_body(StatusCode::BAD_REQUEST, &message),
            SignupError::UnknownBranch(slug) => error_body(
                StatusCode::BAD_REQUEST,
                &format!("Branch '{slug}' not found"),
            ),
            SignupError::EmailTaken => {
                error_body(StatusCode::CONFLICT, "Email is already registered")
            }
            SignupError::Auth(err) => err.into_response(),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn parse_kind(raw: Option<&str>) -> Option<PrincipalKind> {
    raw.and_then(|value| value.parse().ok())
}

pub(crate) fn principal_json(principal: &Principal) -> Value {
    match principal {
        Principal::Admin(admin) => json!({
            "adminId": admin.admin_id,
            "username": admin.username,
            "name": admin.display_name,
            "role": admin.role.as_str(),
            "branchId": admin.role.branch_id(),
        }),
        Principal::Customer(customer) => json!({
            "customerId": customer.customer_id,
            "email": customer.email,
            "name": customer.display_name,
        }),
    }
}

fn session_response(
    cookies: &SessionCookieStore,
    status: StatusCode,
    issued: &IssuedSession,
    mut body: Map<String, Value>,
) -> Response {
    let kind = issued.principal.kind();
    let mut headers = HeaderMap::new();
    if let Err(err) = cookies.write_pair(
        &mut headers,
        kind,
        &issued.access_token,
        &issued.refresh_token,
    ) {
        error!(error = %err, "Failed to render session cookies");
        return err.into_response();
    }

    body.insert("success".to_string(), Value::Bool(true));
    body.insert(kind.as_str().to_string(), principal_json(&issued.principal));
    (status, headers, Json(Value::Object(body))).into_response()
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TypeRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TypeRequest>,
) -> Response {
    let Some(kind) = parse_kind(request.kind.as_deref()) else {
        return error_body(StatusCode::BAD_REQUEST, INVALID_TYPE_MESSAGE);
    };

    let cookies = state.cookies.read(&headers);
    let renewed = match state.auth.renew(kind, cookies.refresh(kind)).await {
        Ok(renewed) => renewed,
        Err(err) => {
            state.metrics.renewal(kind.as_str(), err.kind());
            info!(kind = %kind, reason = err.kind(), "Token renewal refused");
            return error_body(StatusCode::UNAUTHORIZED, REFRESH_FAILED_MESSAGE);
        }
    };

    let mut response_headers = HeaderMap::new();
    let mut cookie_values = vec![state.cookies.access_cookie(kind, &renewed.access_token)];
    if let Some(token) = &renewed.refresh_token {
        cookie_values.push(state.cookies.refresh_cookie(kind, token));
    }
    for value in cookie_values {
        match value {
            Ok(value) => {
                response_headers.append(SET_COOKIE, value);
            }
            Err(err) => {
                error!(error = %err, "Failed to render renewed cookies");
                return err.into_response();
            }
        }
    }

    state.metrics.renewal(kind.as_str(), "success");
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.insert("accessToken".to_string(), json!(renewed.access_token));
    body.insert(kind.as_str().to_string(), principal_json(&renewed.principal));
    (StatusCode::OK, response_headers, Json(Value::Object(body))).into_response()
}

pub async fn refresh_method_not_allowed() -> Response {
    error_body(
        StatusCode::METHOD_NOT_ALLOWED,
        "Method not allowed. Use POST instead.",
    )
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Response {
    match state
        .auth
        .login_admin(&request.username, &request.password)
        .await
    {
        Ok(issued) => {
            state.metrics.login_attempt("admin", "success");
            let redirect_to = match issued.principal.as_admin().and_then(|a| a.role.branch_id()) {
                Some(_) => "/admin/pickup",
                None => "/admin/dashboard",
            };
            let mut body = Map::new();
            body.insert("redirectTo".to_string(), json!(redirect_to));
            session_response(&state.cookies, StatusCode::OK, &issued, body)
        }
        Err(err) => {
            state.metrics.login_attempt("admin", err.kind());
            err.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub branch_slug: Option<String>,
}

pub async fn customer_login(
    State(state): State<AppState>,
    Json(request): Json<CustomerLoginRequest>,
) -> Response {
    match state
        .auth
        .login_customer(&request.email, &request.password)
        .await
    {
        Ok(issued) => {
            state.metrics.login_attempt("customer", "success");
            let mut body = Map::new();
            body.insert(
                "redirectTo".to_string(),
                json!(customer_landing(request.branch_slug.as_deref())),
            );
            session_response(&state.cookies, StatusCode::OK, &issued, body)
        }
        Err(err) => {
            state.metrics.login_attempt("customer", err.kind());
            err.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub branch_slug: String,
}

pub async fn customer_signup(
    State(state): State<AppState>,
    Json(body): Json<SignupBody>,
) -> Response {
    let landing = customer_landing(Some(&body.branch_slug));
    let request = SignupRequest {
        email: body.email,
        password: body.password,
        name: body.name,
        phone: body.phone,
        branch_slug: body.branch_slug,
    };

    match state.auth.signup_customer(request).await {
        Ok(issued) => {
            let mut body = Map::new();
            body.insert("redirectTo".to_string(), json!(landing));
            session_response(&state.cookies, StatusCode::CREATED, &issued, body)
        }
        Err(err) => {
            warn!(error = %err, "Customer signup rejected");
            err.into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, Json(request): Json<TypeRequest>) -> Response {
    let Some(kind) = parse_kind(request.kind.as_deref()) else {
        return error_body(StatusCode::BAD_REQUEST, INVALID_TYPE_MESSAGE);
    };

    let mut headers = HeaderMap::new();
    if let Err(err) = state.cookies.write_clear(&mut headers, kind) {
        return err.into_response();
    }
    (StatusCode::OK, headers, Json(json!({ "success": true }))).into_response()
}

fn token_report(token: Option<&str>) -> Value {
    let Some(token) = token else {
        return json!({ "present": false });
    };
    let now = Utc::now();
    match decode_unverified(token) {
        Some(unverified) => json!({
            "present": true,
            "expiresAt": unverified
                .expires_at()
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            "expired": unverified.is_expired_at(now),
        }),
        None => json!({ "present": true, "readable": false }),
    }
}

/// Session inspection. Authorization uses the verified result only; the
/// unverified token reports are informational.
pub async fn debug_session(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let cookies = state.cookies.read(&headers);
    let codec = state.auth.codec();

    let verified = [PrincipalKind::Admin, PrincipalKind::Customer]
        .into_iter()
        .find_map(|kind| {
            cookies
                .access(kind)
                .and_then(|token| codec.verify_access_for(kind, token).ok())
        });

    let session = match &verified {
        Some(claims) => json!({
            "type": claims.kind().as_str(),
            "role": claims.principal.as_admin().map(|admin| admin.role.as_str()),
            "user": principal_json(&claims.principal),
        }),
        None => json!({ "type": null, "role": null, "user": null }),
    };

    Json(json!({
        "authenticated": verified.is_some(),
        "session": session,
        "tokens": {
            "adminAccess": token_report(cookies.access(PrincipalKind::Admin)),
            "adminRefresh": token_report(cookies.refresh(PrincipalKind::Admin)),
            "customerAccess": token_report(cookies.access(PrincipalKind::Customer)),
            "customerRefresh": token_report(cookies.refresh(PrincipalKind::Customer)),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

fn login_error(message: &str) -> Response {
    found(&format!("/login?error={}", urlencoding::encode(message)))
}

pub async fn identity_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(provider_error) = query.error.as_deref() {
        warn!(
            provider = %provider,
            error = provider_error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Identity provider returned an error"
        );
        let message = if provider_error == "access_denied" {
            "Sign-in was cancelled."
        } else {
            "Sign-in with the identity provider failed."
        };
        return login_error(message);
    }

    let callback = CallbackState::decode(query.state.as_deref());
    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        return login_error("Missing authorization code.");
    };

    let exchange = match state.identity.get(&provider) {
        Ok(exchange) => exchange,
        Err(err) => {
            warn!(error = %err, "Identity callback for unconfigured provider");
            return login_error("Unsupported sign-in provider.");
        }
    };

    let redirect_uri = format!(
        "{}/auth/{provider}/callback",
        state.config.public_base_url
    );
    let identity = match exchange.exchange(code, &redirect_uri).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(provider = %provider, error = %err, "Identity exchange failed");
            state.metrics.login_attempt("customer", "external_rejected");
            return login_error("Could not verify your account with the provider.");
        }
    };

    let issued = match state.auth.sign_in_external(&identity).await {
        Ok(issued) => issued,
        Err(err) => {
            error!(provider = %provider, error = %err, "Failed to sign in external identity");
            state.metrics.login_attempt("customer", err.kind());
            return login_error("Failed to create your account.");
        }
    };

    state.metrics.login_attempt("customer", "success");
    let mut response = found(&callback.redirect_target());
    if let Err(err) = state.cookies.write_pair(
        response.headers_mut(),
        PrincipalKind::Customer,
        &issued.access_token,
        &issued.refresh_token,
    ) {
        error!(error = %err, "Failed to render session cookies");
        return err.into_response();
    }
    response
}

//! Path classification and the forward/redirect decision made for every
//! inbound request before application logic runs.

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::TokenCodec;
use crate::cookies::CookieSet;
use crate::error::{AuthError, AuthResult};
use crate::principal::{AdminPrincipal, AdminRole, CustomerPrincipal, Principal, PrincipalKind};

pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

pub const HEADER_USER_TYPE: &str = "x-user-type";
pub const HEADER_ADMIN_ID: &str = "x-admin-id";
pub const HEADER_ADMIN_USERNAME: &str = "x-admin-username";
pub const HEADER_ADMIN_ROLE: &str = "x-admin-role";
pub const HEADER_ADMIN_BRANCH_ID: &str = "x-admin-branch-id";
pub const HEADER_CUSTOMER_ID: &str = "x-customer-id";
pub const HEADER_CUSTOMER_EMAIL: &str = "x-customer-email";
pub const HEADER_CUSTOMER_NAME: &str = "x-customer-name";

pub const CONTEXT_HEADERS: [&str; 8] = [
    HEADER_USER_TYPE,
    HEADER_ADMIN_ID,
    HEADER_ADMIN_USERNAME,
    HEADER_ADMIN_ROLE,
    HEADER_ADMIN_BRANCH_ID,
    HEADER_CUSTOMER_ID,
    HEADER_CUSTOMER_EMAIL,
    HEADER_CUSTOMER_NAME,
];

const STATIC_EXTENSIONS: [&str; 6] = [".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Admin,
    TenantCustomer { branch: String },
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::Admin => "admin",
            RouteClass::TenantCustomer { .. } => "tenant_customer",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Forward { principal: Option<Principal> },
    Redirect { location: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub path: String,
    pub class: RouteClass,
    pub decision: GateDecision,
}

/// Resolve `.` and `..` segments, including their percent-encoded spellings
/// (`%2e`, `.%2E`, ...), and treat `\` as a separator. The result is the
/// path a downstream server will actually serve, so it is what gets
/// classified and what gets forwarded.
pub fn canonical_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    let mut parts = unified.split('/').skip(1).peekable();
    while let Some(segment) = parts.next() {
        let last = parts.peek().is_none();
        match dot_segment(segment) {
            Some(DotSegment::Current) => {
                if last {
                    segments.push("");
                }
            }
            Some(DotSegment::Parent) => {
                segments.pop();
                if last {
                    segments.push("");
                }
            }
            None => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    if !segment.starts_with(['.', '%']) {
        return None;
    }
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

/// Canonicalize, then map framework data-fetch paths
/// (`/_next/data/<build>/<page>.json`) onto the page path they stand for.
pub fn normalize_path(path: &str) -> String {
    let path = canonical_path(path);
    path.strip_prefix("/_next/data/")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(build, _)| !build.is_empty())
        .and_then(|(_, page)| page.strip_suffix(".json"))
        .map(|page| format!("/{page}"))
        .unwrap_or_else(|| path.clone())
}

fn is_static_asset(path: &str) -> bool {
    if path.starts_with("/_next/static") || path.starts_with("/_next/image") {
        return true;
    }
    if path == "/favicon.ico" {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Classify an already-normalized path.
pub fn classify(path: &str) -> RouteClass {
    if is_static_asset(path) {
        return RouteClass::Public;
    }

    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    match segments.as_slice() {
        [] => RouteClass::Public,
        ["admin", "login", ..] => RouteClass::Public,
        ["admin", ..] => RouteClass::Admin,
        ["api" | "auth", ..] => RouteClass::Public,
        ["login" | "signup"] => RouteClass::Public,
        [_, "login" | "signup", ..] => RouteClass::Public,
        [branch, ..] => RouteClass::TenantCustomer {
            branch: (*branch).to_string(),
        },
    }
}

pub fn customer_login_location(branch: &str, path: &str) -> String {
    format!("/{branch}/login?redirect={}", urlencoding::encode(path))
}

/// Decides, per request, whether to forward (optionally with a verified
/// principal) or redirect to the matching login page. Never authenticates
/// and never applies role-based business rules.
pub struct AuthorizationGate<C> {
    codec: C,
}

impl<C: TokenCodec> AuthorizationGate<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn decide(&self, path: &str, cookies: &CookieSet) -> GateDecision {
        self.evaluate(path, cookies).decision
    }

    pub fn evaluate(&self, raw_path: &str, cookies: &CookieSet) -> GateOutcome {
        let path = normalize_path(raw_path);
        let class = classify(&path);

        let decision = match &class {
            RouteClass::Public => GateDecision::Forward { principal: None },
            RouteClass::Admin => match self.verify_slot(PrincipalKind::Admin, cookies) {
                Ok(principal) => GateDecision::Forward {
                    principal: Some(principal),
                },
                Err(err) => {
                    log_rejection(&path, &class, &err);
                    GateDecision::Redirect {
                        location: ADMIN_LOGIN_PATH.to_string(),
                    }
                }
            },
            RouteClass::TenantCustomer { branch } => {
                match self.verify_slot(PrincipalKind::Customer, cookies) {
                    Ok(principal) => GateDecision::Forward {
                        principal: Some(principal),
                    },
                    Err(err) => {
                        log_rejection(&path, &class, &err);
                        GateDecision::Redirect {
                            location: customer_login_location(branch, &path),
                        }
                    }
                }
            }
        };

        GateOutcome {
            path,
            class,
            decision,
        }
    }

    fn verify_slot(&self, kind: PrincipalKind, cookies: &CookieSet) -> AuthResult<Principal> {
        let token = cookies.access(kind).ok_or(AuthError::MissingCredential)?;
        let claims = self.codec.verify_access_for(kind, token)?;
        Ok(claims.principal)
    }
}

fn log_rejection(path: &str, class: &RouteClass, err: &AuthError) {
    match err {
        AuthError::MissingCredential | AuthError::Expired => {
            debug!(path, class = %class, reason = err.kind(), "gate redirecting to login")
        }
        _ => warn!(path, class = %class, reason = err.kind(), "gate rejected access token"),
    }
}

pub fn strip_context_headers(headers: &mut HeaderMap) {
    for name in CONTEXT_HEADERS {
        headers.remove(name);
    }
}

/// Replace any context headers with ones describing `principal`.
pub fn inject_context_headers(headers: &mut HeaderMap, principal: &Principal) {
    strip_context_headers(headers);
    set_header(headers, HEADER_USER_TYPE, principal.kind().as_str());

    match principal {
        Principal::Admin(admin) => {
            set_header(headers, HEADER_ADMIN_ID, &admin.admin_id.to_string());
            set_header(
                headers,
                HEADER_ADMIN_USERNAME,
                &urlencoding::encode(&admin.username),
            );
            set_header(headers, HEADER_ADMIN_ROLE, admin.role.as_str());
            if let Some(branch_id) = admin.role.branch_id() {
                set_header(headers, HEADER_ADMIN_BRANCH_ID, &branch_id.to_string());
            }
        }
        Principal::Customer(customer) => {
            set_header(headers, HEADER_CUSTOMER_ID, &customer.customer_id.to_string());
            set_header(
                headers,
                HEADER_CUSTOMER_EMAIL,
                &urlencoding::encode(&customer.email),
            );
            if let Some(name) = &customer.display_name {
                set_header(headers, HEADER_CUSTOMER_NAME, &urlencoding::encode(name));
            }
        }
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Rebuild the principal a gate injected upstream. Returns `Ok(None)` when
/// the request carries no context.
///
/// The admin display name is not part of the header contract, so the
/// username stands in for it.
pub fn principal_from_context_headers(headers: &HeaderMap) -> AuthResult<Option<Principal>> {
    let Some(kind) = header_str(headers, HEADER_USER_TYPE)? else {
        return Ok(None);
    };

    let principal = match kind.parse::<PrincipalKind>()? {
        PrincipalKind::Admin => {
            let admin_id = required_uuid(headers, HEADER_ADMIN_ID)?;
            let username = required_decoded(headers, HEADER_ADMIN_USERNAME)?;
            let role_name = header_str(headers, HEADER_ADMIN_ROLE)?
                .ok_or_else(|| missing(HEADER_ADMIN_ROLE))?;
            let branch_id = header_str(headers, HEADER_ADMIN_BRANCH_ID)?
                .map(|raw| parse_uuid(HEADER_ADMIN_BRANCH_ID, raw))
                .transpose()?;
            Principal::Admin(AdminPrincipal {
                admin_id,
                display_name: username.clone(),
                username,
                role: AdminRole::from_parts(role_name, branch_id)?,
            })
        }
        PrincipalKind::Customer => Principal::Customer(CustomerPrincipal {
            customer_id: required_uuid(headers, HEADER_CUSTOMER_ID)?,
            email: required_decoded(headers, HEADER_CUSTOMER_EMAIL)?,
            display_name: header_str(headers, HEADER_CUSTOMER_NAME)?
                .map(decode_display)
                .transpose()?,
        }),
    };

    Ok(Some(principal))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> AuthResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| AuthError::MalformedClaims(format!("{name} is not ASCII")))
        })
        .transpose()
}

fn missing(name: &'static str) -> AuthError {
    AuthError::MalformedClaims(format!("missing {name} header"))
}

fn parse_uuid(name: &'static str, raw: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AuthError::MalformedClaims(format!("{name} is not a UUID")))
}

fn required_uuid(headers: &HeaderMap, name: &'static str) -> AuthResult<Uuid> {
    let raw = header_str(headers, name)?.ok_or_else(|| missing(name))?;
    parse_uuid(name, raw)
}

fn required_decoded(headers: &HeaderMap, name: &'static str) -> AuthResult<String> {
    let raw = header_str(headers, name)?.ok_or_else(|| missing(name))?;
    decode_display(raw)
}

fn decode_display(raw: &str) -> AuthResult<String> {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .map_err(|_| AuthError::MalformedClaims("context header is not valid UTF-8".to_string()))
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

use crate::principal::PrincipalKind;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential cookie missing")]
    MissingCredential,
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
    #[error("expected {expected} token, found {found} token")]
    PrincipalKindMismatch {
        expected: PrincipalKind,
        found: PrincipalKind,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("principal no longer exists")]
    PrincipalNotFound,
    #[error("principal lookup timed out")]
    Timeout,
    #[error("principal store failure: {0}")]
    Store(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    /// Stable label used in logs and metrics; never shown to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Expired => "expired",
            AuthError::MalformedClaims(_) => "malformed_claims",
            AuthError::PrincipalKindMismatch { .. } => "principal_kind_mismatch",
            AuthError::Configuration(_) => "configuration",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::PrincipalNotFound => "principal_not_found",
            AuthError::Timeout => "timeout",
            AuthError::Store(_) => "store",
            AuthError::Signing(_) => "signing",
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::Expired)
    }

    /// True for every failure that happens while checking an already-issued token.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredential
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::MalformedClaims(_)
                | AuthError::PrincipalKindMismatch { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidIssuer => AuthError::MalformedClaims("issuer mismatch".to_string()),
            ErrorKind::InvalidAudience => {
                AuthError::MalformedClaims("audience mismatch".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::MalformedClaims(format!("missing claim '{claim}'"))
            }
            ErrorKind::Json(err) => AuthError::MalformedClaims(err.to_string()),
            ErrorKind::Utf8(err) => AuthError::MalformedClaims(err.to_string()),
            _ => AuthError::InvalidSignature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = if self.is_verification_failure() {
            (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
            )
        } else {
            match &self {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid credentials. Please try again.".to_string(),
                ),
                AuthError::PrincipalNotFound => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHENTICATED",
                    "Authentication required".to_string(),
                ),
                AuthError::Timeout => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "UPSTREAM_TIMEOUT",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERVER_ERROR",
                    "Internal server error".to_string(),
                ),
            }
        };

        let body = ErrorBody {
            code,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

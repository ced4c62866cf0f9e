use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::{AuthError, AuthResult};
use crate::gate::principal_from_context_headers;
use crate::principal::{AdminPrincipal, CustomerPrincipal, Principal, PrincipalKind, Session};

/// Resolve the principal the gate attached to this request: the request
/// extension when running in-process, otherwise the injected context headers.
pub fn session_from_parts(parts: &Parts) -> AuthResult<Session> {
    if let Some(principal) = parts.extensions.get::<Principal>() {
        return Ok(Session::new(principal.clone()));
    }

    principal_from_context_headers(&parts.headers)?
        .map(Session::new)
        .ok_or(AuthError::MissingCredential)
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_from_parts(parts)
    }
}

/// Extractor that only accepts admin sessions.
#[derive(Debug, Clone)]
pub struct AdminSession(pub AdminPrincipal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match session_from_parts(parts)?.principal {
            Principal::Admin(admin) => Ok(Self(admin)),
            Principal::Customer(_) => Err(AuthError::PrincipalKindMismatch {
                expected: PrincipalKind::Admin,
                found: PrincipalKind::Customer,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomerSession(pub CustomerPrincipal);

#[async_trait]
impl<S> FromRequestParts<S> for CustomerSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match session_from_parts(parts)?.principal {
            Principal::Customer(customer) => Ok(Self(customer)),
            Principal::Admin(_) => Err(AuthError::PrincipalKindMismatch {
                expected: PrincipalKind::Customer,
                found: PrincipalKind::Admin,
            }),
        }
    }
}

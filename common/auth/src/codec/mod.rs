//! Signing and verification of access and renewal tokens.
//!
//! Two backends implement [`TokenCodec`]: [`JwtCodec`] for the application
//! layer and [`EdgeCodec`] for the request-interception layer. Both produce
//! compact HS256 JWS tokens with the same claim shape, so a token minted by
//! one verifies under the other.

mod edge;
mod jwt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::claims::{AccessClaims, RenewalClaims};
use crate::config::CodecConfig;
use crate::error::{AuthError, AuthResult};
use crate::principal::{Principal, PrincipalKind};

pub use edge::EdgeCodec;
pub use jwt::JwtCodec;

/// Which of the two credential types a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

pub trait TokenCodec: Send + Sync {
    fn config(&self) -> &CodecConfig;

    fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String>;

    fn encode_renewal(&self, claims: &RenewalClaims) -> AuthResult<String>;

    /// Checks signature, issuer, audience and expiry together.
    fn verify_access(&self, token: &str) -> AuthResult<AccessClaims>;

    fn verify_renewal(&self, token: &str) -> AuthResult<RenewalClaims>;

    fn sign_access(&self, principal: &Principal) -> AuthResult<String> {
        let claims = AccessClaims::issue(principal.clone(), self.config(), Utc::now());
        self.encode_access(&claims)
    }

    fn sign_renewal(&self, principal: &Principal) -> AuthResult<String> {
        let claims = RenewalClaims::issue(principal, self.config(), Utc::now());
        self.encode_renewal(&claims)
    }

    /// Verify an access token read from the cookie slot of `expected`.
    fn verify_access_for(
        &self,
        expected: PrincipalKind,
        token: &str,
    ) -> AuthResult<AccessClaims> {
        let claims = self.verify_access(token)?;
        let found = claims.kind();
        if found != expected {
            return Err(AuthError::PrincipalKindMismatch { expected, found });
        }
        Ok(claims)
    }

    fn verify_renewal_for(
        &self,
        expected: PrincipalKind,
        token: &str,
    ) -> AuthResult<RenewalClaims> {
        let claims = self.verify_renewal(token)?;
        let found = claims.principal_kind;
        if found != expected {
            return Err(AuthError::PrincipalKindMismatch { expected, found });
        }
        Ok(claims)
    }
}

/// Payload of a token read without any signature or expiry check.
///
/// For inspection and diagnostics only. Never make an authorization
/// decision from this.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    pub payload: Value,
}

impl UnverifiedToken {
    pub fn principal_kind(&self) -> Option<PrincipalKind> {
        self.payload
            .get("type")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.payload
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => expires_at < now,
            None => true,
        }
    }
}

pub fn decode_unverified(token: &str) -> Option<UnverifiedToken> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let payload = serde_json::from_slice(&bytes).ok()?;
    Some(UnverifiedToken { payload })
}

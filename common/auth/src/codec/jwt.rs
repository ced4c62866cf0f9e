use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use tracing::debug;

use super::TokenCodec;
use crate::claims::{AccessClaims, AccessClaimsRepr, RenewalClaims, RenewalClaimsRepr};
use crate::config::CodecConfig;
use crate::error::{AuthError, AuthResult};

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Application-layer codec built on `jsonwebtoken`.
pub struct JwtCodec {
    config: CodecConfig,
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl JwtCodec {
    pub fn new(config: CodecConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = 0;

        Self {
            access: KeyPair::from_secret(config.access_secret.as_bytes()),
            refresh: KeyPair::from_secret(config.refresh_secret.as_bytes()),
            config,
            validation,
        }
    }

    fn decode_payload(&self, token: &str, key: &DecodingKey) -> AuthResult<Value> {
        let data = decode::<Value>(token, key, &self.validation)?;
        Ok(data.claims)
    }
}

impl TokenCodec for JwtCodec {
    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String> {
        let repr = AccessClaimsRepr::from(claims);
        encode(&Header::new(Algorithm::HS256), &repr, &self.access.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    fn encode_renewal(&self, claims: &RenewalClaims) -> AuthResult<String> {
        let repr = RenewalClaimsRepr::from(claims);
        encode(&Header::new(Algorithm::HS256), &repr, &self.refresh.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let payload = self.decode_payload(token, &self.access.decoding)?;
        let claims = AccessClaims::try_from(payload)?;
        debug!(kind = %claims.kind(), "verified access token");
        Ok(claims)
    }

    fn verify_renewal(&self, token: &str) -> AuthResult<RenewalClaims> {
        let payload = self.decode_payload(token, &self.refresh.decoding)?;
        let claims = RenewalClaims::try_from(payload)?;
        debug!(kind = %claims.principal_kind, "verified renewal token");
        Ok(claims)
    }
}

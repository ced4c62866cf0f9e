use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use super::TokenCodec;
use crate::claims::{
    validate_registered, AccessClaims, AccessClaimsRepr, RenewalClaims, RenewalClaimsRepr,
};
use crate::config::{CodecConfig, TokenSecret};
use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Interception-layer codec: a minimal HS256 JWS implementation over
/// `hmac`/`sha2`, with no JWT library and no I/O.
pub struct EdgeCodec {
    config: CodecConfig,
    encoded_header: String,
}

impl EdgeCodec {
    pub fn new(config: CodecConfig) -> Self {
        let header = JwsHeader {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        // Serializing two plain strings cannot fail.
        let header_json = serde_json::to_vec(&header).unwrap_or_default();
        Self {
            config,
            encoded_header: URL_SAFE_NO_PAD.encode(header_json),
        }
    }

    fn sign<T: Serialize>(&self, secret: &TokenSecret, payload: &T) -> AuthResult<String> {
        let payload =
            serde_json::to_vec(payload).map_err(|err| AuthError::Signing(err.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            self.encoded_header,
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = mac_for(secret)?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    fn verify_payload(&self, secret: &TokenSecret, token: &str) -> AuthResult<Value> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidSignature);
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| AuthError::InvalidSignature)?;
        let parsed: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|err| AuthError::MalformedClaims(err.to_string()))?;
        if parsed.alg != ALGORITHM {
            return Err(AuthError::InvalidSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidSignature)?;
        let mut mac = mac_for(secret)?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::InvalidSignature)?;
        let payload: Value = serde_json::from_slice(&payload_bytes)
            .map_err(|err| AuthError::MalformedClaims(err.to_string()))?;

        validate_registered(&payload, &self.config, Utc::now())?;
        Ok(payload)
    }
}

fn mac_for(secret: &TokenSecret) -> AuthResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AuthError::Configuration(err.to_string()))
}

impl TokenCodec for EdgeCodec {
    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String> {
        self.sign(&self.config.access_secret, &AccessClaimsRepr::from(claims))
    }

    fn encode_renewal(&self, claims: &RenewalClaims) -> AuthResult<String> {
        self.sign(&self.config.refresh_secret, &RenewalClaimsRepr::from(claims))
    }

    fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let payload = self.verify_payload(&self.config.access_secret, token)?;
        let claims = AccessClaims::try_from(payload)?;
        debug!(kind = %claims.kind(), "verified access token at edge");
        Ok(claims)
    }

    fn verify_renewal(&self, token: &str) -> AuthResult<RenewalClaims> {
        let payload = self.verify_payload(&self.config.refresh_secret, token)?;
        RenewalClaims::try_from(payload)
    }
}

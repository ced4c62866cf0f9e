use std::env;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_ISSUER: &str = "momslab";
pub const DEFAULT_AUDIENCE: &str = "momslab-app";

pub const ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

/// Symmetric signing secret. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(Arc<[u8]>);

impl TokenSecret {
    pub fn new(value: impl AsRef<[u8]>) -> AuthResult<Self> {
        let bytes = value.as_ref();
        if bytes.is_empty() {
            return Err(AuthError::Configuration("signing secret is empty".to_string()));
        }
        Ok(Self(Arc::from(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(**redacted**)")
    }
}

/// Runtime configuration shared by both token codecs.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    pub access_secret: TokenSecret,
    pub refresh_secret: TokenSecret,
}

impl CodecConfig {
    pub fn new(access_secret: TokenSecret, refresh_secret: TokenSecret) -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_secret,
            refresh_secret,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Load both secrets plus optional issuer/audience overrides. A missing
    /// secret is a configuration error; there is no fallback value.
    pub fn from_env() -> AuthResult<Self> {
        let access_secret = required_secret(ACCESS_SECRET_ENV)?;
        let refresh_secret = required_secret(REFRESH_SECRET_ENV)?;
        if access_secret == refresh_secret {
            return Err(AuthError::Configuration(format!(
                "{ACCESS_SECRET_ENV} and {REFRESH_SECRET_ENV} must differ"
            )));
        }

        let mut config = Self::new(access_secret, refresh_secret);
        if let Some(issuer) = optional_env("JWT_ISSUER") {
            config = config.with_issuer(issuer);
        }
        if let Some(audience) = optional_env("JWT_AUDIENCE") {
            config = config.with_audience(audience);
        }
        Ok(config)
    }
}

fn required_secret(key: &str) -> AuthResult<TokenSecret> {
    let value = env::var(key)
        .map_err(|_| AuthError::Configuration(format!("{key} must be set")))?;
    TokenSecret::new(value.trim())
        .map_err(|_| AuthError::Configuration(format!("{key} must not be empty")))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use anyhow::{anyhow, Context, Result};
use common_auth::{CodecConfig, CookieSettings, SameSite};
use std::env;
use std::time::Duration;

const DEFAULT_RENEWAL_LOOKUP_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub codec: CodecConfig,
    pub cookies: CookieSettings,
    /// Upper bound on the principal re-fetch during renewal.
    pub renewal_lookup_timeout: Duration,
    pub rotate_refresh_tokens: bool,
    pub database_url: Option<String>,
    pub upstream_url: Option<String>,
    /// Origin used to build external identity callback URLs.
    pub public_base_url: String,
    pub kakao_client_id: Option<String>,
    pub kakao_client_secret: Option<String>,
}

impl AuthConfig {
    /// Defaults for everything except the signing material.
    pub fn new(codec: CodecConfig) -> Self {
        Self {
            codec,
            cookies: CookieSettings::default(),
            renewal_lookup_timeout: Duration::from_millis(DEFAULT_RENEWAL_LOOKUP_TIMEOUT_MS),
            rotate_refresh_tokens: false,
            database_url: None,
            upstream_url: None,
            public_base_url: "http://localhost:3000".to_string(),
            kakao_client_id: None,
            kakao_client_secret: None,
        }
    }
}

pub fn load_auth_config() -> Result<AuthConfig> {
    let codec = CodecConfig::from_env().context("Failed to load token signing configuration")?;

    let production = env::var("APP_ENV")
        .map(|value| value.trim().eq_ignore_ascii_case("production"))
        .unwrap_or(false);
    let secure = bool_from_env("AUTH_COOKIE_SECURE").unwrap_or(production);
    let same_site = env::var("AUTH_COOKIE_SAMESITE")
        .ok()
        .map(|value| parse_same_site(&value))
        .transpose()
        .context("Failed to parse AUTH_COOKIE_SAMESITE")?
        .unwrap_or(SameSite::Lax);

    let renewal_lookup_timeout = env::var("AUTH_RENEWAL_LOOKUP_TIMEOUT_MS")
        .ok()
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|err| anyhow!("Invalid AUTH_RENEWAL_LOOKUP_TIMEOUT_MS '{value}': {err}"))
        })
        .transpose()?
        .unwrap_or(DEFAULT_RENEWAL_LOOKUP_TIMEOUT_MS);

    let rotate_refresh_tokens = bool_from_env("AUTH_ROTATE_REFRESH_TOKENS").unwrap_or(false);

    let database_url = env::var("DATABASE_URL")
        .ok()
        .and_then(|value| normalize_optional(&value));
    let upstream_url = env::var("UPSTREAM_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .map(|value| value.trim_end_matches('/').to_string());
    let public_base_url = env::var("PUBLIC_BASE_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let kakao_client_id = env::var("KAKAO_CLIENT_ID")
        .ok()
        .and_then(|value| normalize_optional(&value));
    let kakao_client_secret = env::var("KAKAO_CLIENT_SECRET")
        .ok()
        .and_then(|value| normalize_optional(&value));

    Ok(AuthConfig {
        codec,
        cookies: CookieSettings { secure, same_site },
        renewal_lookup_timeout: Duration::from_millis(renewal_lookup_timeout),
        rotate_refresh_tokens,
        database_url,
        upstream_url,
        public_base_url,
        kakao_client_id,
        kakao_client_secret,
    })
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => Err(anyhow!(
            "Unsupported cookie same-site policy '{other}'. Use Lax, Strict, or None."
        )),
    }
}

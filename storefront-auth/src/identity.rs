//! External identity providers. Each provider turns an authorization code
//! into a verified [`ExternalIdentity`]; everything after that point is
//! handled by the authentication service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl ExternalIdentity {
    /// The email the local customer is keyed by. Providers that withhold
    /// the address get a stable placeholder derived from the subject.
    pub fn resolved_email(&self) -> String {
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!(
                "{provider}_{subject}@{provider}.placeholder",
                provider = self.provider,
                subject = self.subject
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unknown identity provider '{0}'")]
    UnknownProvider(String),
    #[error("provider rejected the authorization code: {0}")]
    Rejected(String),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityExchange: Send + Sync {
    async fn exchange(&self, code: &str, redirect_uri: &str)
        -> Result<ExternalIdentity, IdentityError>;
}

#[derive(Clone, Default)]
pub struct IdentityProviders {
    providers: HashMap<String, Arc<dyn IdentityExchange>>,
}

impl IdentityProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, provider: Arc<dyn IdentityExchange>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityExchange>, IdentityError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownProvider(name.to_string()))
    }
}

/// Where to send the browser once the provider round-trip completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackState {
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub branch_slug: Option<String>,
}

impl CallbackState {
    /// Decode the base64 JSON `state` parameter. Anything unreadable falls
    /// back to the default state.
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|value| !value.is_empty()) else {
            return Self::default();
        };
        let bytes = STANDARD
            .decode(raw)
            .or_else(|_| URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')));
        match bytes.ok().and_then(|bytes| serde_json::from_slice(&bytes).ok()) {
            Some(state) => state,
            None => {
                warn!("Failed to decode identity callback state");
                Self::default()
            }
        }
    }

    /// Only same-origin absolute paths are honoured.
    pub fn redirect_target(&self) -> String {
        match self.redirect.as_deref() {
            Some(path) if is_same_origin_path(path) => path.to_string(),
            _ => customer_landing(self.branch_slug.as_deref()),
        }
    }
}

/// A branch slug is a single path segment of ASCII letters, digits, `-`
/// and `_`.
pub fn is_branch_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}

/// Where a customer lands after signing in: the branch's product list, or
/// the site root when there is no usable branch.
pub fn customer_landing(branch_slug: Option<&str>) -> String {
    match branch_slug.map(str::trim) {
        Some(slug) if is_branch_slug(slug) => format!("/{slug}/products"),
        _ => "/".to_string(),
    }
}

/// Rejects targets a browser could resolve to another host.
fn is_same_origin_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

const KAKAO_TOKEN_URL: &str = "https://kauth.kakao.com/oauth/token";
const KAKAO_USER_URL: &str = "https://kapi.kakao.com/v2/user/me";

pub struct KakaoExchange {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
    token_url: String,
    user_url: String,
}

#[derive(Deserialize)]
struct KakaoToken {
    access_token: String,
}

#[derive(Deserialize)]
struct KakaoUser {
    id: i64,
    #[serde(default)]
    kakao_account: Option<KakaoAccount>,
}

#[derive(Deserialize)]
struct KakaoAccount {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    profile: Option<KakaoProfile>,
}

#[derive(Deserialize)]
struct KakaoProfile {
    #[serde(default)]
    nickname: Option<String>,
}

impl KakaoExchange {
    pub fn new(client: Client, client_id: String, client_secret: Option<String>) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            token_url: KAKAO_TOKEN_URL.to_string(),
            user_url: KAKAO_USER_URL.to_string(),
        }
    }

    pub fn with_endpoints(mut self, token_url: impl Into<String>, user_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.user_url = user_url.into();
        self
    }
}

#[async_trait]
impl IdentityExchange for KakaoExchange {
    async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ExternalIdentity, IdentityError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(&self.token_url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(IdentityError::Rejected(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: KakaoToken = response.json().await?;

        let response = self
            .client
            .get(&self.user_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IdentityError::Rejected(format!(
                "user endpoint returned {}",
                response.status()
            )));
        }
        let user: KakaoUser = response.json().await?;

        let account = user.kakao_account;
        let email = account.as_ref().and_then(|account| account.email.clone());
        let display_name = account
            .and_then(|account| account.profile)
            .and_then(|profile| profile.nickname);

        Ok(ExternalIdentity {
            provider: "kakao".to_string(),
            subject: user.id.to_string(),
            email,
            display_name,
        })
    }
}

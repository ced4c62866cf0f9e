use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::Cookie;

use crate::claims::{ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};
use crate::codec::TokenKind;
use crate::error::{AuthError, AuthResult};
use crate::principal::PrincipalKind;

pub const ADMIN_ACCESS_COOKIE: &str = "admin_access_token";
pub const ADMIN_REFRESH_COOKIE: &str = "admin_refresh_token";
pub const CUSTOMER_ACCESS_COOKIE: &str = "customer_access_token";
pub const CUSTOMER_REFRESH_COOKIE: &str = "customer_refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

pub fn cookie_name(kind: PrincipalKind, token: TokenKind) -> &'static str {
    match (kind, token) {
        (PrincipalKind::Admin, TokenKind::Access) => ADMIN_ACCESS_COOKIE,
        (PrincipalKind::Admin, TokenKind::Refresh) => ADMIN_REFRESH_COOKIE,
        (PrincipalKind::Customer, TokenKind::Access) => CUSTOMER_ACCESS_COOKIE,
        (PrincipalKind::Customer, TokenKind::Refresh) => CUSTOMER_REFRESH_COOKIE,
    }
}

/// The four session cookie slots as read from one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    pub admin_access: Option<String>,
    pub admin_refresh: Option<String>,
    pub customer_access: Option<String>,
    pub customer_refresh: Option<String>,
}

impl CookieSet {
    pub fn get(&self, kind: PrincipalKind, token: TokenKind) -> Option<&str> {
        let slot = match (kind, token) {
            (PrincipalKind::Admin, TokenKind::Access) => &self.admin_access,
            (PrincipalKind::Admin, TokenKind::Refresh) => &self.admin_refresh,
            (PrincipalKind::Customer, TokenKind::Access) => &self.customer_access,
            (PrincipalKind::Customer, TokenKind::Refresh) => &self.customer_refresh,
        };
        slot.as_deref()
    }

    pub fn access(&self, kind: PrincipalKind) -> Option<&str> {
        self.get(kind, TokenKind::Access)
    }

    pub fn refresh(&self, kind: PrincipalKind) -> Option<&str> {
        self.get(kind, TokenKind::Refresh)
    }

    fn assign(&mut self, name: &str, value: &str) {
        let slot = match name {
            ADMIN_ACCESS_COOKIE => &mut self.admin_access,
            ADMIN_REFRESH_COOKIE => &mut self.admin_refresh,
            CUSTOMER_ACCESS_COOKIE => &mut self.customer_access,
            CUSTOMER_REFRESH_COOKIE => &mut self.customer_refresh,
            _ => return,
        };
        // First occurrence wins, as browsers send the most specific path first.
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }
}

/// Reads and writes the session cookies with fixed attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCookieStore {
    settings: CookieSettings,
}

impl SessionCookieStore {
    pub fn new(settings: CookieSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> CookieSettings {
        self.settings
    }

    pub fn read(&self, headers: &HeaderMap) -> CookieSet {
        let mut set = CookieSet::default();
        for header in headers.get_all(COOKIE) {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse(raw).flatten() {
                set.assign(cookie.name(), cookie.value_trimmed());
            }
        }
        set
    }

    pub fn access_cookie(&self, kind: PrincipalKind, token: &str) -> AuthResult<HeaderValue> {
        self.render(
            cookie_name(kind, TokenKind::Access),
            token,
            ACCESS_TOKEN_TTL_SECONDS,
        )
    }

    pub fn refresh_cookie(&self, kind: PrincipalKind, token: &str) -> AuthResult<HeaderValue> {
        self.render(
            cookie_name(kind, TokenKind::Refresh),
            token,
            REFRESH_TOKEN_TTL_SECONDS,
        )
    }

    /// Deletion cookies for both slots of `kind`.
    pub fn clear(&self, kind: PrincipalKind) -> AuthResult<[HeaderValue; 2]> {
        Ok([
            self.render(cookie_name(kind, TokenKind::Access), "", 0)?,
            self.render(cookie_name(kind, TokenKind::Refresh), "", 0)?,
        ])
    }

    /// Append an access + renewal pair to a response's headers, replacing
    /// nothing else.
    pub fn write_pair(
        &self,
        headers: &mut HeaderMap,
        kind: PrincipalKind,
        access: &str,
        refresh: &str,
    ) -> AuthResult<()> {
        headers.append(SET_COOKIE, self.access_cookie(kind, access)?);
        headers.append(SET_COOKIE, self.refresh_cookie(kind, refresh)?);
        Ok(())
    }

    pub fn write_clear(&self, headers: &mut HeaderMap, kind: PrincipalKind) -> AuthResult<()> {
        for value in self.clear(kind)? {
            headers.append(SET_COOKIE, value);
        }
        Ok(())
    }

    fn render(&self, name: &str, value: &str, max_age: i64) -> AuthResult<HeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite={}",
            self.settings.same_site.as_str()
        );
        if self.settings.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|err| AuthError::Signing(format!("invalid cookie value: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_picks_only_session_slots() {
        let store = SessionCookieStore::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static(
                "theme=dark; admin_access_token=aaa; customer_refresh_token=rrr; admin_refresh_token=",
            ),
        );

        let set = store.read(&headers);
        assert_eq!(set.access(PrincipalKind::Admin), Some("aaa"));
        assert_eq!(set.refresh(PrincipalKind::Customer), Some("rrr"));
        assert_eq!(set.refresh(PrincipalKind::Admin), None);
        assert_eq!(set.access(PrincipalKind::Customer), None);
    }

    #[test]
    fn read_handles_quoting_and_repeated_headers() {
        let store = SessionCookieStore::default();
        let mut headers = HeaderMap::new();
        headers.append(
            COOKIE,
            HeaderValue::from_static("admin_access_token=\"aaa\";theme=dark"),
        );
        headers.append(
            COOKIE,
            HeaderValue::from_static("admin_access_token=later; customer_access_token=ccc"),
        );

        let set = store.read(&headers);
        assert_eq!(set.access(PrincipalKind::Admin), Some("aaa"));
        assert_eq!(set.access(PrincipalKind::Customer), Some("ccc"));
    }

    #[test]
    fn read_skips_malformed_pairs() {
        let store = SessionCookieStore::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("=orphan; garbage; customer_refresh_token=rrr"),
        );

        let set = store.read(&headers);
        assert_eq!(set.refresh(PrincipalKind::Customer), Some("rrr"));
        assert_eq!(set.access(PrincipalKind::Admin), None);
    }

    #[test]
    fn access_cookie_attributes() {
        let store = SessionCookieStore::new(CookieSettings {
            secure: true,
            same_site: SameSite::Lax,
        });
        let value = store
            .access_cookie(PrincipalKind::Customer, "tok")
            .unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "customer_access_token=tok; Path=/; Max-Age=900; HttpOnly; SameSite=Lax; Secure"
        );
    }

    #[test]
    fn refresh_cookie_without_secure_outside_production() {
        let store = SessionCookieStore::default();
        let value = store.refresh_cookie(PrincipalKind::Admin, "r").unwrap();
        let rendered = value.to_str().unwrap();
        assert!(rendered.starts_with("admin_refresh_token=r;"));
        assert!(rendered.contains("Max-Age=604800"));
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn clear_writes_empty_values_with_zero_max_age() {
        let store = SessionCookieStore::default();
        let [access, refresh] = store.clear(PrincipalKind::Admin).unwrap();
        assert!(access
            .to_str()
            .unwrap()
            .starts_with("admin_access_token=; Path=/; Max-Age=0"));
        assert!(refresh
            .to_str()
            .unwrap()
            .starts_with("admin_refresh_token=; Path=/; Max-Age=0"));
    }
}

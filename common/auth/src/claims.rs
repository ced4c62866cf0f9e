use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CodecConfig;
use crate::error::{AuthError, AuthResult};
use crate::principal::{AdminPrincipal, AdminRole, CustomerPrincipal, Principal, PrincipalKind};

/// Access tokens live for 15 minutes.
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
/// Renewal tokens live for 7 days.
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Verified contents of an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub audience: String,
}

impl AccessClaims {
    pub fn issue(principal: Principal, config: &CodecConfig, now: DateTime<Utc>) -> Self {
        let issued_at = truncate_to_seconds(now);
        Self {
            principal,
            issued_at,
            expires_at: issued_at + Duration::seconds(ACCESS_TOKEN_TTL_SECONDS),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        self.principal.kind()
    }
}

/// Verified contents of a renewal token. Deliberately carries only the
/// subject and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalClaims {
    pub subject_id: Uuid,
    pub principal_kind: PrincipalKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub audience: String,
}

impl RenewalClaims {
    pub fn issue(principal: &Principal, config: &CodecConfig, now: DateTime<Utc>) -> Self {
        let issued_at = truncate_to_seconds(now);
        Self {
            subject_id: principal.subject_id(),
            principal_kind: principal.kind(),
            issued_at,
            expires_at: issued_at + Duration::seconds(REFRESH_TOKEN_TTL_SECONDS),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }
}

fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(value.timestamp(), 0)
        .single()
        .unwrap_or(value)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

impl AudienceRepr {
    fn into_single(self) -> AuthResult<String> {
        match self {
            AudienceRepr::Single(item) => Ok(item),
            AudienceRepr::Many(mut items) if items.len() == 1 => Ok(items.remove(0)),
            AudienceRepr::Many(_) => Err(AuthError::MalformedClaims(
                "expected a single audience".to_string(),
            )),
        }
    }
}

/// Wire representation of an access token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessClaimsRepr {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    iat: i64,
    exp: i64,
    iss: String,
    aud: AudienceRepr,
}

impl From<&AccessClaims> for AccessClaimsRepr {
    fn from(claims: &AccessClaims) -> Self {
        let mut repr = AccessClaimsRepr {
            kind: claims.kind().as_str().to_string(),
            admin_id: None,
            username: None,
            role: None,
            branch_id: None,
            customer_id: None,
            email: None,
            name: None,
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
            iss: claims.issuer.clone(),
            aud: AudienceRepr::Single(claims.audience.clone()),
        };

        match &claims.principal {
            Principal::Admin(admin) => {
                repr.admin_id = Some(admin.admin_id.to_string());
                repr.username = Some(admin.username.clone());
                repr.name = Some(admin.display_name.clone());
                repr.role = Some(admin.role.as_str().to_string());
                repr.branch_id = admin.role.branch_id().map(|id| id.to_string());
            }
            Principal::Customer(customer) => {
                repr.customer_id = Some(customer.customer_id.to_string());
                repr.email = Some(customer.email.clone());
                repr.name = customer.display_name.clone();
            }
        }

        repr
    }
}

impl TryFrom<AccessClaimsRepr> for AccessClaims {
    type Error = AuthError;

    fn try_from(value: AccessClaimsRepr) -> AuthResult<Self> {
        let kind: PrincipalKind = value.kind.parse()?;
        let principal = match kind {
            PrincipalKind::Admin => {
                let admin_id = parse_uuid("adminId", &required("adminId", value.admin_id)?)?;
                let branch_id = value
                    .branch_id
                    .as_deref()
                    .map(|raw| parse_uuid("branchId", raw))
                    .transpose()?;
                let role = AdminRole::from_parts(&required("role", value.role)?, branch_id)?;
                Principal::Admin(AdminPrincipal {
                    admin_id,
                    username: required("username", value.username)?,
                    display_name: required("name", value.name)?,
                    role,
                })
            }
            PrincipalKind::Customer => {
                let customer_id =
                    parse_uuid("customerId", &required("customerId", value.customer_id)?)?;
                Principal::Customer(CustomerPrincipal {
                    customer_id,
                    email: required("email", value.email)?,
                    display_name: value.name,
                })
            }
        };

        Ok(Self {
            principal,
            issued_at: timestamp("iat", value.iat)?,
            expires_at: timestamp("exp", value.exp)?,
            issuer: value.iss,
            audience: value.aud.into_single()?,
        })
    }
}

/// Wire representation of a renewal token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RenewalClaimsRepr {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    iat: i64,
    exp: i64,
    iss: String,
    aud: AudienceRepr,
}

impl From<&RenewalClaims> for RenewalClaimsRepr {
    fn from(claims: &RenewalClaims) -> Self {
        Self {
            id: claims.subject_id.to_string(),
            kind: claims.principal_kind.as_str().to_string(),
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
            iss: claims.issuer.clone(),
            aud: AudienceRepr::Single(claims.audience.clone()),
        }
    }
}

impl TryFrom<RenewalClaimsRepr> for RenewalClaims {
    type Error = AuthError;

    fn try_from(value: RenewalClaimsRepr) -> AuthResult<Self> {
        Ok(Self {
            subject_id: parse_uuid("id", &value.id)?,
            principal_kind: value.kind.parse()?,
            issued_at: timestamp("iat", value.iat)?,
            expires_at: timestamp("exp", value.exp)?,
            issuer: value.iss,
            audience: value.aud.into_single()?,
        })
    }
}

impl TryFrom<serde_json::Value> for AccessClaims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: AccessClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::MalformedClaims(err.to_string()))?;
        AccessClaims::try_from(repr)
    }
}

impl TryFrom<serde_json::Value> for RenewalClaims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: RenewalClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::MalformedClaims(err.to_string()))?;
        RenewalClaims::try_from(repr)
    }
}

/// Registered-claim checks shared by every backend: expiry first, then
/// issuer, then audience.
pub(crate) fn validate_registered(
    payload: &serde_json::Value,
    config: &CodecConfig,
    now: DateTime<Utc>,
) -> AuthResult<()> {
    let exp = payload
        .get("exp")
        .ok_or_else(|| AuthError::MalformedClaims("missing claim 'exp'".to_string()))?
        .as_i64()
        .ok_or_else(|| AuthError::MalformedClaims("claim 'exp' is not an integer".to_string()))?;
    if exp < now.timestamp() {
        return Err(AuthError::Expired);
    }

    let iss = payload
        .get("iss")
        .and_then(|value| value.as_str())
        .ok_or_else(|| AuthError::MalformedClaims("missing claim 'iss'".to_string()))?;
    if iss != config.issuer {
        return Err(AuthError::MalformedClaims("issuer mismatch".to_string()));
    }

    let audience_matches = match payload.get("aud") {
        Some(serde_json::Value::String(aud)) => aud == &config.audience,
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str() == Some(config.audience.as_str())),
        _ => return Err(AuthError::MalformedClaims("missing claim 'aud'".to_string())),
    };
    if !audience_matches {
        return Err(AuthError::MalformedClaims("audience mismatch".to_string()));
    }

    Ok(())
}

fn required(field: &'static str, value: Option<String>) -> AuthResult<String> {
    value
        .filter(|item| !item.is_empty())
        .ok_or_else(|| AuthError::MalformedClaims(format!("missing claim '{field}'")))
}

fn parse_uuid(field: &'static str, raw: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| AuthError::MalformedClaims(format!("claim '{field}' is not a UUID")))
}

fn timestamp(field: &'static str, value: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::MalformedClaims(format!("claim '{field}' out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenSecret;
    use serde_json::json;

    fn config() -> CodecConfig {
        CodecConfig::new(
            TokenSecret::new("access").unwrap(),
            TokenSecret::new("refresh").unwrap(),
        )
    }

    #[test]
    fn access_lifetime_is_fixed() {
        let principal = Principal::Customer(CustomerPrincipal {
            customer_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            display_name: None,
        });
        let now = Utc::now();
        let claims = AccessClaims::issue(principal.clone(), &config(), now);
        assert_eq!(
            (claims.expires_at - claims.issued_at).num_seconds(),
            ACCESS_TOKEN_TTL_SECONDS
        );

        let renewal = RenewalClaims::issue(&principal, &config(), now);
        assert_eq!(
            (renewal.expires_at - renewal.issued_at).num_seconds(),
            REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(renewal.subject_id, principal.subject_id());
    }

    #[test]
    fn admin_payload_uses_camel_case_wire_names() {
        let branch = Uuid::new_v4();
        let principal = Principal::Admin(AdminPrincipal {
            admin_id: Uuid::new_v4(),
            username: "gangnam-owner".into(),
            display_name: "Gangnam Owner".into(),
            role: AdminRole::BranchAdmin { branch_id: branch },
        });
        let claims = AccessClaims::issue(principal, &config(), Utc::now());
        let value = serde_json::to_value(AccessClaimsRepr::from(&claims)).unwrap();

        assert_eq!(value["type"], "admin");
        assert_eq!(value["role"], "branch_admin");
        assert_eq!(value["branchId"], branch.to_string());
        assert!(value.get("customerId").is_none());
        assert_eq!(AccessClaims::try_from(value).unwrap(), claims);
    }

    #[test]
    fn customer_payload_without_id_is_malformed() {
        let value = json!({
            "type": "customer",
            "email": "a@example.com",
            "iat": 1, "exp": 2, "iss": "momslab", "aud": "momslab-app"
        });
        let err = AccessClaims::try_from(value).expect_err("missing id");
        assert!(matches!(err, AuthError::MalformedClaims(_)));
    }

    #[test]
    fn registered_claims_check_expiry_before_issuer() {
        let now = Utc::now();
        let payload = json!({ "exp": now.timestamp() - 1, "iss": "other", "aud": "x" });
        let err = validate_registered(&payload, &config(), now).expect_err("expired");
        assert!(err.is_expired());

        let payload = json!({ "exp": now.timestamp() + 60, "iss": "other", "aud": "momslab-app" });
        let err = validate_registered(&payload, &config(), now).expect_err("issuer");
        assert!(matches!(err, AuthError::MalformedClaims(_)));
    }
}

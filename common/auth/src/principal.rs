use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

pub const ROLE_ORG_ADMIN: &str = "org_admin";
pub const ROLE_BRANCH_ADMIN: &str = "branch_admin";

// Spellings written by the previous storefront backend.
const LEGACY_ROLE_ORG_ADMIN: &str = "super_admin";
const LEGACY_ROLE_BRANCH_ADMIN: &str = "branch_owner";

/// Which of the two disjoint principal populations a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Admin,
    Customer,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Admin => "admin",
            PrincipalKind::Customer => "customer",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(PrincipalKind::Admin),
            "customer" => Ok(PrincipalKind::Customer),
            other => Err(AuthError::MalformedClaims(format!(
                "unknown principal type '{other}'"
            ))),
        }
    }
}

/// Admin sub-role. A branch admin always carries the branch it is scoped to;
/// an organization admin never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminRole {
    OrgAdmin,
    BranchAdmin { branch_id: Uuid },
}

impl AdminRole {
    /// Build a role from its wire name and optional branch scope.
    pub fn from_parts(role: &str, branch_id: Option<Uuid>) -> Result<Self, AuthError> {
        match (role, branch_id) {
            (ROLE_ORG_ADMIN | LEGACY_ROLE_ORG_ADMIN, None) => Ok(AdminRole::OrgAdmin),
            (ROLE_ORG_ADMIN | LEGACY_ROLE_ORG_ADMIN, Some(_)) => Err(AuthError::MalformedClaims(
                "organization admin must not carry a branch scope".to_string(),
            )),
            (ROLE_BRANCH_ADMIN | LEGACY_ROLE_BRANCH_ADMIN, Some(branch_id)) => {
                Ok(AdminRole::BranchAdmin { branch_id })
            }
            (ROLE_BRANCH_ADMIN | LEGACY_ROLE_BRANCH_ADMIN, None) => Err(
                AuthError::MalformedClaims("branch admin is missing its branch scope".to_string()),
            ),
            (other, _) => Err(AuthError::MalformedClaims(format!(
                "unknown admin role '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::OrgAdmin => ROLE_ORG_ADMIN,
            AdminRole::BranchAdmin { .. } => ROLE_BRANCH_ADMIN,
        }
    }

    pub fn branch_id(&self) -> Option<Uuid> {
        match self {
            AdminRole::OrgAdmin => None,
            AdminRole::BranchAdmin { branch_id } => Some(*branch_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    pub admin_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerPrincipal {
    pub customer_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

/// The authenticated identity attached to a request after verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin(AdminPrincipal),
    Customer(CustomerPrincipal),
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::Admin(_) => PrincipalKind::Admin,
            Principal::Customer(_) => PrincipalKind::Customer,
        }
    }

    pub fn subject_id(&self) -> Uuid {
        match self {
            Principal::Admin(admin) => admin.admin_id,
            Principal::Customer(customer) => customer.customer_id,
        }
    }

    pub fn as_admin(&self) -> Option<&AdminPrincipal> {
        match self {
            Principal::Admin(admin) => Some(admin),
            Principal::Customer(_) => None,
        }
    }

    pub fn as_customer(&self) -> Option<&CustomerPrincipal> {
        match self {
            Principal::Admin(_) => None,
            Principal::Customer(customer) => Some(customer),
        }
    }
}

impl From<AdminPrincipal> for Principal {
    fn from(value: AdminPrincipal) -> Self {
        Principal::Admin(value)
    }
}

impl From<CustomerPrincipal> for Principal {
    fn from(value: CustomerPrincipal) -> Self {
        Principal::Customer(value)
    }
}

/// Request-scoped view of who is calling; rebuilt on every request from a
/// verified access token and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn kind(&self) -> PrincipalKind {
        self.principal.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_admin_requires_branch_scope() {
        let err = AdminRole::from_parts("branch_admin", None).expect_err("missing branch");
        assert!(matches!(err, AuthError::MalformedClaims(_)));

        let branch = Uuid::new_v4();
        let role = AdminRole::from_parts("branch_admin", Some(branch)).expect("role");
        assert_eq!(role.branch_id(), Some(branch));
        assert_eq!(role.as_str(), "branch_admin");
    }

    #[test]
    fn org_admin_rejects_branch_scope() {
        assert!(AdminRole::from_parts("org_admin", Some(Uuid::new_v4())).is_err());
        assert_eq!(
            AdminRole::from_parts("org_admin", None).expect("role"),
            AdminRole::OrgAdmin
        );
    }

    #[test]
    fn legacy_role_names_are_accepted() {
        assert_eq!(
            AdminRole::from_parts("super_admin", None).expect("role"),
            AdminRole::OrgAdmin
        );
        let branch = Uuid::new_v4();
        assert_eq!(
            AdminRole::from_parts("branch_owner", Some(branch)).expect("role"),
            AdminRole::BranchAdmin { branch_id: branch }
        );
    }

    #[test]
    fn principal_kind_parses_wire_names() {
        assert_eq!("admin".parse::<PrincipalKind>().unwrap(), PrincipalKind::Admin);
        assert_eq!(
            "customer".parse::<PrincipalKind>().unwrap(),
            PrincipalKind::Customer
        );
        assert!("staff".parse::<PrincipalKind>().is_err());
    }
}

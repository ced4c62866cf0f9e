use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::principal::{AdminPrincipal, AdminRole};

/// Coarse role checks applied by application logic after the gate has
/// admitted a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    OrgAdminRequired,
    BranchOutOfScope { branch_id: Uuid },
}

impl GuardError {
    pub fn into_parts(self) -> (StatusCode, String) {
        match self {
            GuardError::OrgAdminRequired => (
                StatusCode::FORBIDDEN,
                "Organization administrator role required".to_string(),
            ),
            GuardError::BranchOutOfScope { branch_id } => (
                StatusCode::FORBIDDEN,
                format!("Branch {branch_id} is outside this administrator's scope"),
            ),
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_parts()
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, message) = self.into_parts();
        (status, Json(json!({ "code": "FORBIDDEN", "error": message }))).into_response()
    }
}

pub fn ensure_org_admin(admin: &AdminPrincipal) -> Result<(), GuardError> {
    match admin.role {
        AdminRole::OrgAdmin => Ok(()),
        AdminRole::BranchAdmin { .. } => Err(GuardError::OrgAdminRequired),
    }
}

/// Organization admins may act on any branch; branch admins only on their own.
pub fn ensure_branch_scope(admin: &AdminPrincipal, branch_id: Uuid) -> Result<(), GuardError> {
    match admin.role {
        AdminRole::OrgAdmin => Ok(()),
        AdminRole::BranchAdmin { branch_id: own } if own == branch_id => Ok(()),
        AdminRole::BranchAdmin { .. } => Err(GuardError::BranchOutOfScope { branch_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(role: AdminRole) -> AdminPrincipal {
        AdminPrincipal {
            admin_id: Uuid::new_v4(),
            username: "staff".into(),
            display_name: "Staff".into(),
            role,
        }
    }

    #[test]
    fn branch_admin_is_limited_to_own_branch() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let staff = admin(AdminRole::BranchAdmin { branch_id: own });

        assert!(ensure_branch_scope(&staff, own).is_ok());
        assert_eq!(
            ensure_branch_scope(&staff, other),
            Err(GuardError::BranchOutOfScope { branch_id: other })
        );
        assert_eq!(ensure_org_admin(&staff), Err(GuardError::OrgAdminRequired));
    }

    #[test]
    fn org_admin_passes_every_check() {
        let root = admin(AdminRole::OrgAdmin);
        assert!(ensure_org_admin(&root).is_ok());
        assert!(ensure_branch_scope(&root, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn guard_error_maps_to_forbidden() {
        let (status, message) = GuardError::OrgAdminRequired.into();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(message.contains("Organization"));
    }
}

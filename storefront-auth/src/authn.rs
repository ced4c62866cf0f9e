use std::sync::Arc;
use std::time::Duration;

use common_auth::{
    AuthError, AuthResult, CustomerPrincipal, JwtCodec, Principal, PrincipalKind, TokenCodec,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{is_branch_slug, ExternalIdentity};
use crate::password::{hash_password, verify_against_dummy, verify_password, PasswordError};
use crate::store::{NewCustomer, PrincipalStore, StoreError};

/// A freshly minted access + renewal pair for one principal.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub principal: Principal,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RenewedSession {
    pub principal: Principal,
    pub access_token: String,
    /// Present only when renewal-token rotation is enabled.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub branch_slug: String,
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("email is already registered")]
    EmailTaken,
    #[error("branch '{0}' not found")]
    UnknownBranch(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<StoreError> for SignupError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateEmail => SignupError::EmailTaken,
            other => SignupError::Auth(other.into()),
        }
    }
}

pub struct AuthenticationService {
    store: Arc<dyn PrincipalStore>,
    codec: Arc<JwtCodec>,
    renewal_lookup_timeout: Duration,
    rotate_refresh_tokens: bool,
}

impl AuthenticationService {
    pub fn new(store: Arc<dyn PrincipalStore>, codec: Arc<JwtCodec>) -> Self {
        Self {
            store,
            codec,
            renewal_lookup_timeout: Duration::from_secs(3),
            rotate_refresh_tokens: false,
        }
    }

    pub fn with_renewal_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_lookup_timeout = timeout;
        self
    }

    pub fn with_refresh_rotation(mut self, enabled: bool) -> Self {
        self.rotate_refresh_tokens = enabled;
        self
    }

    pub fn codec(&self) -> &JwtCodec {
        &self.codec
    }

    pub async fn login_admin(&self, username: &str, password: &str) -> AuthResult<IssuedSession> {
        let username = username.trim();
        let Some(record) = self.store.admin_by_username(username).await? else {
            verify_against_dummy(password);
            debug!("admin login for unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &record.password_hash) {
            debug!(admin_id = %record.id, "admin password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let principal = record.to_principal()?;
        info!(admin_id = %principal.admin_id, role = principal.role.as_str(), "admin signed in");
        self.mint(Principal::Admin(principal))
    }

    pub async fn login_customer(&self, email: &str, password: &str) -> AuthResult<IssuedSession> {
        let email = email.trim();
        let Some(record) = self.store.customer_by_email(email).await? else {
            verify_against_dummy(password);
            debug!("customer login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        // Accounts created through an external provider have no password.
        let Some(hash) = record.password_hash.as_deref() else {
            verify_against_dummy(password);
            debug!(customer_id = %record.id, "customer has no password set");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, hash) {
            debug!(customer_id = %record.id, "customer password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        info!(customer_id = %record.id, "customer signed in");
        self.mint(Principal::Customer(record.to_principal()))
    }

    pub async fn signup_customer(&self, request: SignupRequest) -> Result<IssuedSession, SignupError> {
        let email = request.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(SignupError::InvalidInput("A valid email is required".to_string()));
        }
        let branch_slug = request.branch_slug.trim();
        if branch_slug.is_empty() {
            return Err(SignupError::InvalidInput("branchSlug is required".to_string()));
        }
        if !is_branch_slug(branch_slug) {
            return Err(SignupError::InvalidInput("branchSlug is invalid".to_string()));
        }

        if self.store.customer_by_email(&email).await?.is_some() {
            return Err(SignupError::EmailTaken);
        }

        let branch = self
            .store
            .branch_by_slug(branch_slug)
            .await?
            .ok_or_else(|| SignupError::UnknownBranch(branch_slug.to_string()))?;

        let password_hash = hash_password(&request.password).map_err(|err| match err {
            PasswordError::Empty => SignupError::InvalidInput("Password must not be empty".to_string()),
            PasswordError::Hash(message) => SignupError::Auth(AuthError::Store(message)),
        })?;

        let record = self
            .store
            .insert_customer(NewCustomer {
                email,
                name: request.name.filter(|name| !name.trim().is_empty()),
                phone: request.phone.filter(|phone| !phone.trim().is_empty()),
                branch_id: Some(branch.id),
                password_hash: Some(password_hash),
            })
            .await?;

        info!(customer_id = %record.id, branch = %branch.slug, "customer signed up");
        Ok(self.mint(Principal::Customer(record.to_principal()))?)
    }

    /// Resolve (or create) the local customer for a verified external
    /// identity and mint a session for it.
    pub async fn sign_in_external(&self, identity: &ExternalIdentity) -> AuthResult<IssuedSession> {
        let email = identity.resolved_email();
        let record = match self.store.customer_by_email(&email).await? {
            Some(record) => record,
            None => {
                let created = self
                    .store
                    .insert_customer(NewCustomer {
                        email: email.clone(),
                        name: identity.display_name.clone(),
                        phone: None,
                        branch_id: None,
                        password_hash: None,
                    })
                    .await;
                match created {
                    Ok(record) => {
                        info!(
                            customer_id = %record.id,
                            provider = %identity.provider,
                            "created customer from external identity"
                        );
                        record
                    }
                    // Lost a race with a concurrent first sign-in.
                    Err(StoreError::DuplicateEmail) => self
                        .store
                        .customer_by_email(&email)
                        .await?
                        .ok_or(AuthError::PrincipalNotFound)?,
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let mut principal: CustomerPrincipal = record.to_principal();
        if principal.display_name.is_none() {
            principal.display_name = identity.display_name.clone();
        }
        self.mint(Principal::Customer(principal))
    }

    /// Exchange a renewal token for a new access token. The principal is
    /// rebuilt from the current stored record, never from the token.
    pub async fn renew(
        &self,
        kind: PrincipalKind,
        refresh_token: Option<&str>,
    ) -> AuthResult<RenewedSession> {
        let token = refresh_token.ok_or(AuthError::MissingCredential)?;
        let claims = self.codec.verify_renewal_for(kind, token)?;

        let principal = self.refetch(kind, claims.subject_id).await?;
        let access_token = self.codec.sign_access(&principal)?;
        let refresh_token = if self.rotate_refresh_tokens {
            Some(self.codec.sign_renewal(&principal)?)
        } else {
            None
        };

        debug!(kind = %kind, subject = %claims.subject_id, "renewed access token");
        Ok(RenewedSession {
            principal,
            access_token,
            refresh_token,
        })
    }

    async fn lookup(
        &self,
        kind: PrincipalKind,
        subject_id: Uuid,
    ) -> Result<Option<Principal>, StoreError> {
        match kind {
            PrincipalKind::Admin => match self.store.admin_by_id(subject_id).await? {
                Some(record) => Ok(Some(Principal::Admin(record.to_principal()?))),
                None => Ok(None),
            },
            PrincipalKind::Customer => Ok(self
                .store
                .customer_by_id(subject_id)
                .await?
                .map(|record| Principal::Customer(record.to_principal()))),
        }
    }

    async fn refetch(&self, kind: PrincipalKind, subject_id: Uuid) -> AuthResult<Principal> {
        let lookup = self.lookup(kind, subject_id);
        match tokio::time::timeout(self.renewal_lookup_timeout, lookup).await {
            Ok(Ok(Some(principal))) => Ok(principal),
            Ok(Ok(None)) => Err(AuthError::PrincipalNotFound),
            Ok(Err(err)) => {
                warn!(kind = %kind, subject = %subject_id, error = %err, "renewal lookup failed");
                Err(err.into())
            }
            Err(_) => {
                warn!(kind = %kind, subject = %subject_id, "renewal lookup timed out");
                Err(AuthError::Timeout)
            }
        }
    }

    fn mint(&self, principal: Principal) -> AuthResult<IssuedSession> {
        let access_token = self.codec.sign_access(&principal)?;
        let refresh_token = self.codec.sign_renewal(&principal)?;
        Ok(IssuedSession {
            principal,
            access_token,
            refresh_token,
        })
    }
}

//! Read/write access to the admin, customer and branch records the
//! authentication flows depend on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::{AdminPrincipal, AdminRole, AuthError, CustomerPrincipal};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a customer with this email already exists")]
    DuplicateEmail,
    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        AuthError::Store(value.to_string())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AdminRecord {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub role: String,
    pub branch_id: Option<Uuid>,
    pub password_hash: String,
}

impl AdminRecord {
    pub fn to_principal(&self) -> Result<AdminPrincipal, StoreError> {
        let role = AdminRole::from_parts(&self.role, self.branch_id)
            .map_err(|err| StoreError::InvalidRecord(format!("admin {}: {err}", self.id)))?;
        Ok(AdminPrincipal {
            admin_id: self.id,
            username: self.username.clone(),
            display_name: self.name.clone(),
            role,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub branch_id: Option<Uuid>,
    /// Absent for customers created through an external identity provider.
    pub password_hash: Option<String>,
}

impl CustomerRecord {
    pub fn to_principal(&self) -> CustomerPrincipal {
        CustomerPrincipal {
            customer_id: self.id,
            email: self.email.clone(),
            display_name: self.name.clone().filter(|name| !name.is_empty()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub branch_id: Option<Uuid>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BranchRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn admin_by_username(&self, username: &str) -> Result<Option<AdminRecord>, StoreError>;

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminRecord>, StoreError>;

    async fn customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>, StoreError>;

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<CustomerRecord>, StoreError>;

    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerRecord, StoreError>;

    async fn branch_by_slug(&self, slug: &str) -> Result<Option<BranchRecord>, StoreError>;
}

pub struct PgPrincipalStore {
    db: PgPool,
}

impl PgPrincipalStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const ADMIN_COLUMNS: &str = "id, username, name, role, branch_id, password_hash";
const CUSTOMER_COLUMNS: &str = "id, email, name, phone, branch_id, password_hash";

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn admin_by_username(&self, username: &str) -> Result<Option<AdminRecord>, StoreError> {
        let record = sqlx::query_as::<_, AdminRecord>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminRecord>, StoreError> {
        let record = sqlx::query_as::<_, AdminRecord>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>, StoreError> {
        let record = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<CustomerRecord>, StoreError> {
        let record = sqlx::query_as::<_, CustomerRecord>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerRecord, StoreError> {
        let created_at: DateTime<Utc> = Utc::now();
        let result = sqlx::query_as::<_, CustomerRecord>(&format!(
            "INSERT INTO customers (id, email, name, phone, branch_id, password_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.branch_id)
        .bind(&customer.password_hash)
        .bind(created_at)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(StoreError::DuplicateEmail)
            }
            Err(err) => Err(StoreError::Database(err)),
        }
    }

    async fn branch_by_slug(&self, slug: &str) -> Result<Option<BranchRecord>, StoreError> {
        let record = sqlx::query_as::<_, BranchRecord>(
            "SELECT id, slug, name FROM branches WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }
}

#[derive(Default)]
struct Tables {
    admins: HashMap<Uuid, AdminRecord>,
    customers: HashMap<Uuid, CustomerRecord>,
    branches: HashMap<String, BranchRecord>,
}

/// Process-local store for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryPrincipalStore {
    tables: Arc<RwLock<Tables>>,
    lookup_delay: Option<Duration>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every id lookup, to exercise renewal timeouts.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub async fn upsert_admin(&self, record: AdminRecord) {
        self.tables.write().await.admins.insert(record.id, record);
    }

    pub async fn upsert_customer(&self, record: CustomerRecord) {
        self.tables.write().await.customers.insert(record.id, record);
    }

    pub async fn upsert_branch(&self, record: BranchRecord) {
        self.tables
            .write()
            .await
            .branches
            .insert(record.slug.clone(), record);
    }

    pub async fn remove_customer(&self, id: Uuid) {
        self.tables.write().await.customers.remove(&id);
    }

    async fn delay(&self) {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn admin_by_username(&self, username: &str) -> Result<Option<AdminRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .find(|admin| admin.username == username)
            .cloned())
    }

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminRecord>, StoreError> {
        self.delay().await;
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn customer_by_email(&self, email: &str) -> Result<Option<CustomerRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|customer| customer.email == email)
            .cloned())
    }

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<CustomerRecord>, StoreError> {
        self.delay().await;
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn insert_customer(&self, customer: NewCustomer) -> Result<CustomerRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .customers
            .values()
            .any(|existing| existing.email == customer.email)
        {
            return Err(StoreError::DuplicateEmail);
        }

        let record = CustomerRecord {
            id: Uuid::new_v4(),
            email: customer.email,
            name: customer.name,
            phone: customer.phone,
            branch_id: customer.branch_id,
            password_hash: customer.password_hash,
        };
        tables.customers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn branch_by_slug(&self, slug: &str) -> Result<Option<BranchRecord>, StoreError> {
        Ok(self.tables.read().await.branches.get(slug).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_record_with_branch_becomes_branch_admin() {
        let branch = Uuid::new_v4();
        let record = AdminRecord {
            id: Uuid::new_v4(),
            username: "owner".into(),
            name: "Owner".into(),
            role: "branch_owner".into(),
            branch_id: Some(branch),
            password_hash: String::new(),
        };
        let principal = record.to_principal().unwrap();
        assert_eq!(principal.role, AdminRole::BranchAdmin { branch_id: branch });
    }

    #[test]
    fn branch_admin_without_branch_is_invalid() {
        let record = AdminRecord {
            id: Uuid::new_v4(),
            username: "owner".into(),
            name: "Owner".into(),
            role: "branch_admin".into(),
            branch_id: None,
            password_hash: String::new(),
        };
        assert!(matches!(
            record.to_principal(),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_store_rejects_duplicate_email() {
        let store = InMemoryPrincipalStore::new();
        let new = NewCustomer {
            email: "dup@example.com".into(),
            name: None,
            phone: None,
            branch_id: None,
            password_hash: None,
        };
        store.insert_customer(new.clone()).await.unwrap();
        let err = store.insert_customer(new).await.expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateEmail));
    }
}

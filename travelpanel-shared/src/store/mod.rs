/// Storage seam
///
/// Services talk to storage through the [`Store`] trait so the same business
/// rules run against Postgres in production and an in-memory store in tests
/// and local development.
///
/// All state-changing request writes are conditional: they return `Ok(None)`
/// when the row is missing or not in the expected state. The multi-row
/// writes ([`Store::cancel_access`], [`Store::complete_signup`]) are atomic.

pub mod memory;
pub mod postgres;

use crate::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use crate::models::agency::{Agency, Branding, NewAgency};
use crate::models::document::{Collection, NewDocument, TenantDocument};
use crate::models::identity::Identity;
use crate::models::user::{NewUser, User};
use crate::tenant::query::ScopedQuery;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write (payload names the constraint)
    #[error("Conflict on {0}")]
    Conflict(String),

    /// A conditional write inside a transaction matched no rows
    #[error("Conditional update did not match")]
    CasFailed,

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Rows written by a successful signup
#[derive(Debug, Clone)]
pub struct SignupRecord {
    /// Request whose code is being redeemed
    pub request_id: Uuid,
    pub agency: NewAgency,
    pub user: NewUser,
}

/// Result of [`Store::complete_signup`]
#[derive(Debug, Clone)]
pub struct SignupRows {
    pub request: AccessRequest,
    pub agency: Agency,
    pub user: User,
}

/// Persistence operations used by the services
#[async_trait]
pub trait Store: Send + Sync {
    /// Verifies the backend is reachable
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_request(&self, data: NewAccessRequest) -> Result<AccessRequest, StoreError>;

    async fn find_request(&self, id: Uuid) -> Result<Option<AccessRequest>, StoreError>;

    /// Exact match on a normalized code
    async fn find_request_by_code(&self, code: &str) -> Result<Option<AccessRequest>, StoreError>;

    /// Newest first
    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccessRequest>, StoreError>;

    /// `pending -> approved`; `Conflict` if `code` is already issued
    async fn approve_request(
        &self,
        id: Uuid,
        code: &str,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError>;

    /// `pending -> rejected`
    async fn reject_request(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Option<AccessRequest>, StoreError>;

    /// `approved -> cancelled` for a request bound to `agency_id`, clearing
    /// the agency's beta access in the same transaction
    async fn cancel_access(
        &self,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError>;

    /// Sets `code_used` and binds `agency_id` while the code is unredeemed
    async fn mark_code_used(
        &self,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<AccessRequest>, StoreError>;

    /// Redeems the code and inserts the agency and its admin user atomically
    ///
    /// Returns `CasFailed` if the code was already redeemed (or the request
    /// is no longer approved); nothing is written in that case.
    async fn complete_signup(&self, record: SignupRecord) -> Result<SignupRows, StoreError>;

    async fn find_agency(&self, id: Uuid) -> Result<Option<Agency>, StoreError>;

    async fn update_branding(
        &self,
        id: Uuid,
        branding: &Branding,
    ) -> Result<Option<Agency>, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn touch_user_login(&self, id: Uuid) -> Result<(), StoreError>;

    /// `Conflict` if the email is already registered
    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Identity, StoreError>;

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_document(&self, data: NewDocument) -> Result<TenantDocument, StoreError>;

    /// Unscoped lookup; ownership is checked by the caller
    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<TenantDocument>, StoreError>;

    async fn query_documents(&self, query: &ScopedQuery) -> Result<Vec<TenantDocument>, StoreError>;

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
        data: JsonValue,
    ) -> Result<Option<TenantDocument>, StoreError>;

    async fn delete_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool, StoreError>;
}

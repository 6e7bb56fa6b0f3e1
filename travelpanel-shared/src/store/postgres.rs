/// Postgres-backed [`Store`]

use super::{SignupRecord, SignupRows, Store, StoreError};
use crate::db::pool::health_check;
use crate::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use crate::models::agency::{Agency, Branding};
use crate::models::document::{Collection, NewDocument, TenantDocument};
use crate::models::identity::Identity;
use crate::models::user::User;
use crate::tenant::query::ScopedQuery;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(health_check(&self.pool).await?)
    }

    async fn insert_request(&self, data: NewAccessRequest) -> Result<AccessRequest, StoreError> {
        Ok(AccessRequest::create(&self.pool, data).await?)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<AccessRequest>, StoreError> {
        Ok(AccessRequest::find_by_id(&self.pool, id).await?)
    }

    async fn find_request_by_code(&self, code: &str) -> Result<Option<AccessRequest>, StoreError> {
        Ok(AccessRequest::find_by_code(&self.pool, code).await?)
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccessRequest>, StoreError> {
        Ok(AccessRequest::list(&self.pool, status, limit, offset).await?)
    }

    async fn approve_request(
        &self,
        id: Uuid,
        code: &str,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        Ok(AccessRequest::approve(&self.pool, id, code, actor).await?)
    }

    async fn reject_request(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Option<AccessRequest>, StoreError> {
        Ok(AccessRequest::reject(&self.pool, id, actor, notes).await?)
    }

    async fn cancel_access(
        &self,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(request) = AccessRequest::cancel(&mut *tx, id, agency_id, actor).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        if Agency::revoke_beta(&mut *tx, agency_id).await?.is_none() {
            debug!(agency_id = %agency_id, "Cancelled request points at a missing agency");
        }

        tx.commit().await?;
        Ok(Some(request))
    }

    async fn mark_code_used(
        &self,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<AccessRequest>, StoreError> {
        Ok(AccessRequest::mark_code_used(&self.pool, id, agency_id).await?)
    }

    async fn complete_signup(&self, record: SignupRecord) -> Result<SignupRows, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The request row lock taken here serializes concurrent redemptions
        let Some(request) =
            AccessRequest::mark_code_used(&mut *tx, record.request_id, record.agency.id).await?
        else {
            tx.rollback().await?;
            return Err(StoreError::CasFailed);
        };

        let agency = Agency::create(&mut *tx, record.agency).await?;
        let user = User::create(&mut *tx, record.user).await?;

        tx.commit().await?;
        Ok(SignupRows {
            request,
            agency,
            user,
        })
    }

    async fn find_agency(&self, id: Uuid) -> Result<Option<Agency>, StoreError> {
        Ok(Agency::find_by_id(&self.pool, id).await?)
    }

    async fn update_branding(
        &self,
        id: Uuid,
        branding: &Branding,
    ) -> Result<Option<Agency>, StoreError> {
        Ok(Agency::update_branding(&self.pool, id, branding).await?)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn touch_user_login(&self, id: Uuid) -> Result<(), StoreError> {
        User::update_last_login(&self.pool, id).await?;
        Ok(())
    }

    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Identity, StoreError> {
        Ok(Identity::create(&self.pool, email, password_hash).await?)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(Identity::find_by_email(&self.pool, email).await?)
    }

    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(Identity::delete(&self.pool, id).await?)
    }

    async fn insert_document(&self, data: NewDocument) -> Result<TenantDocument, StoreError> {
        Ok(TenantDocument::insert(&self.pool, data).await?)
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<TenantDocument>, StoreError> {
        Ok(TenantDocument::find(&self.pool, collection, id).await?)
    }

    async fn query_documents(&self, query: &ScopedQuery) -> Result<Vec<TenantDocument>, StoreError> {
        Ok(TenantDocument::query(&self.pool, query).await?)
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
        data: JsonValue,
    ) -> Result<Option<TenantDocument>, StoreError> {
        Ok(TenantDocument::update(&self.pool, collection, id, agency_id, data).await?)
    }

    async fn delete_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(TenantDocument::delete(&self.pool, collection, id, agency_id).await?)
    }
}

/// In-memory [`Store`]
///
/// Backs the test suites and `STORAGE_BACKEND=memory` development runs. Each
/// operation takes the write lock once, so conditional updates and the signup
/// write are atomic just as they are in Postgres. Uniqueness rules mirror the
/// database constraints.

use super::{SignupRecord, SignupRows, Store, StoreError};
use crate::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use crate::models::agency::{Agency, Branding};
use crate::models::document::{Collection, NewDocument, TenantDocument};
use crate::models::identity::Identity;
use crate::models::user::User;
use crate::tenant::query::ScopedQuery;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    requests: HashMap<Uuid, AccessRequest>,
    agencies: HashMap<Uuid, Agency>,
    users: HashMap<Uuid, User>,
    identities: HashMap<Uuid, Identity>,
    documents: HashMap<Uuid, TenantDocument>,
}

impl State {
    fn code_taken(&self, code: &str) -> bool {
        self.requests
            .values()
            .any(|r| r.approval_code.as_deref() == Some(code))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of agencies stored (test helper)
    pub async fn agency_count(&self) -> usize {
        self.state.read().await.agencies.len()
    }

    /// Number of identities stored (test helper)
    pub async fn identity_count(&self) -> usize {
        self.state.read().await.identities.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_request(&self, data: NewAccessRequest) -> Result<AccessRequest, StoreError> {
        let request = AccessRequest::pending(data);
        let mut state = self.state.write().await;
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<AccessRequest>, StoreError> {
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn find_request_by_code(&self, code: &str) -> Result<Option<AccessRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .find(|r| r.approval_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccessRequest>, StoreError> {
        let state = self.state.read().await;
        let mut requests: Vec<AccessRequest> = state
            .requests
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn approve_request(
        &self,
        id: Uuid,
        code: &str,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let mut state = self.state.write().await;

        if state.code_taken(code) {
            return Err(StoreError::Conflict(
                "idx_agency_requests_approval_code".to_string(),
            ));
        }

        let Some(request) = state
            .requests
            .get_mut(&id)
            .filter(|r| r.status == RequestStatus::Pending)
        else {
            return Ok(None);
        };

        request.status = RequestStatus::Approved;
        request.approval_code = Some(code.to_string());
        request.code_used = false;
        request.approved_by = Some(actor.to_string());
        request.approved_at = Some(Utc::now());
        Ok(Some(request.clone()))
    }

    async fn reject_request(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let mut state = self.state.write().await;

        let Some(request) = state
            .requests
            .get_mut(&id)
            .filter(|r| r.status == RequestStatus::Pending)
        else {
            return Ok(None);
        };

        request.status = RequestStatus::Rejected;
        request.rejected_by = Some(actor.to_string());
        request.rejection_notes = notes.map(str::to_string);
        request.rejected_at = Some(Utc::now());
        Ok(Some(request.clone()))
    }

    async fn cancel_access(
        &self,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let mut state = self.state.write().await;

        let Some(request) = state.requests.get_mut(&id).filter(|r| {
            r.status == RequestStatus::Approved && r.agency_id == Some(agency_id)
        }) else {
            return Ok(None);
        };

        request.status = RequestStatus::Cancelled;
        request.cancelled_by = Some(actor.to_string());
        request.cancelled_at = Some(Utc::now());
        let request = request.clone();

        if let Some(agency) = state.agencies.get_mut(&agency_id) {
            agency.beta_access = false;
            agency.beta_granted_at = None;
            agency.updated_at = Utc::now();
        }

        Ok(Some(request))
    }

    async fn mark_code_used(
        &self,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let mut state = self.state.write().await;

        let Some(request) = state
            .requests
            .get_mut(&id)
            .filter(|r| r.status == RequestStatus::Approved && !r.code_used)
        else {
            return Ok(None);
        };

        request.code_used = true;
        request.agency_id = Some(agency_id);
        request.code_used_at = Some(Utc::now());
        Ok(Some(request.clone()))
    }

    async fn complete_signup(&self, record: SignupRecord) -> Result<SignupRows, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let redeemable = state
            .requests
            .get(&record.request_id)
            .map_or(false, |r| r.status == RequestStatus::Approved && !r.code_used);
        if !redeemable {
            return Err(StoreError::CasFailed);
        }

        // Check every constraint before touching anything
        if state.agencies.values().any(|a| a.request_id == record.request_id) {
            return Err(StoreError::Conflict("agencies_request_id_key".to_string()));
        }
        if state.agencies.contains_key(&record.agency.id) {
            return Err(StoreError::Conflict("agencies_pkey".to_string()));
        }
        if state.users.contains_key(&record.user.id) {
            return Err(StoreError::Conflict("users_pkey".to_string()));
        }
        if state.users.values().any(|u| u.email == record.user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let agency = record.agency.into_agency(now);
        let user = record.user.into_user(now);

        let request = state
            .requests
            .get_mut(&record.request_id)
            .ok_or(StoreError::CasFailed)?;
        request.code_used = true;
        request.agency_id = Some(agency.id);
        request.code_used_at = Some(now);
        let request = request.clone();

        state.agencies.insert(agency.id, agency.clone());
        state.users.insert(user.id, user.clone());

        Ok(SignupRows {
            request,
            agency,
            user,
        })
    }

    async fn find_agency(&self, id: Uuid) -> Result<Option<Agency>, StoreError> {
        Ok(self.state.read().await.agencies.get(&id).cloned())
    }

    async fn update_branding(
        &self,
        id: Uuid,
        branding: &Branding,
    ) -> Result<Option<Agency>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.agencies.get_mut(&id).map(|agency| {
            agency.branding = branding.clone();
            agency.updated_at = Utc::now();
            agency.clone()
        }))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn touch_user_login(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(user) = self.state.write().await.users.get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Identity, StoreError> {
        let mut state = self.state.write().await;

        if state.identities.values().any(|i| i.email == email) {
            return Err(StoreError::Conflict("identities_email_key".to_string()));
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let state = self.state.read().await;
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.write().await.identities.remove(&id).is_some())
    }

    async fn insert_document(&self, data: NewDocument) -> Result<TenantDocument, StoreError> {
        let doc = data.into_document(Utc::now());
        self.state
            .write()
            .await
            .documents
            .insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<TenantDocument>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .get(&id)
            .filter(|d| d.collection == collection)
            .cloned())
    }

    async fn query_documents(&self, query: &ScopedQuery) -> Result<Vec<TenantDocument>, StoreError> {
        let state = self.state.read().await;
        let mut docs: Vec<TenantDocument> = state
            .documents
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();

        if query.is_newest_first() {
            docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        } else {
            docs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        docs.truncate(query.limit_value() as usize);
        Ok(docs)
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
        data: JsonValue,
    ) -> Result<Option<TenantDocument>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .documents
            .get_mut(&id)
            .filter(|d| d.collection == collection && d.agency_id == agency_id)
            .map(|doc| {
                doc.data = data;
                doc.updated_at = Utc::now();
                doc.clone()
            }))
    }

    async fn delete_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let owned = state
            .documents
            .get(&id)
            .map_or(false, |d| d.collection == collection && d.agency_id == agency_id);

        if owned {
            state.documents.remove(&id);
        }
        Ok(owned)
    }
}

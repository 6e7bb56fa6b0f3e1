/// End-to-end access-request flows over the in-memory store
///
/// Run with: cargo test --test access_flow_tests

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use travelpanel_shared::access::code::is_approval_code_format;
use travelpanel_shared::access::{AccessError, AccessService, CodeErrorKind};
use travelpanel_shared::auth::identity::{IdentityError, IdentityProvider, PasswordIdentityProvider};
use travelpanel_shared::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use travelpanel_shared::models::agency::{Agency, Branding};
use travelpanel_shared::models::document::{Collection, NewDocument, TenantDocument};
use travelpanel_shared::models::identity::Identity;
use travelpanel_shared::models::user::User;
use travelpanel_shared::signup::{SignupCredentials, SignupError, SignupService};
use travelpanel_shared::store::{MemoryStore, SignupRecord, SignupRows, Store, StoreError};
use travelpanel_shared::tenant::{AgencyId, ScopedQuery, TenantDocuments, TenantError};
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    access: AccessService,
    signup: SignupService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let access = AccessService::new(store.clone());
    let identities = Arc::new(PasswordIdentityProvider::new(store.clone()));
    let signup = SignupService::new(access.clone(), identities);
    Harness {
        store,
        access,
        signup,
    }
}

fn acme() -> NewAccessRequest {
    NewAccessRequest {
        agency_name: "Acme Travel".to_string(),
        contact_email: "a@acme.com".to_string(),
        phone_number: None,
        group_type: None,
        message: None,
    }
}

fn credentials() -> SignupCredentials {
    SignupCredentials {
        password: "Sunr1se!Tours".to_string(),
        name: None,
    }
}

/// Store whose approval-code lookups fail as if the pool were exhausted
struct CodeLookupOutage {
    inner: MemoryStore,
}

#[async_trait]
impl Store for CodeLookupOutage {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_request(&self, data: NewAccessRequest) -> Result<AccessRequest, StoreError> {
        self.inner.insert_request(data).await
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<AccessRequest>, StoreError> {
        self.inner.find_request(id).await
    }

    async fn find_request_by_code(&self, _code: &str) -> Result<Option<AccessRequest>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccessRequest>, StoreError> {
        self.inner.list_requests(status, limit, offset).await
    }

    async fn approve_request(
        &self,
        id: Uuid,
        code: &str,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        self.inner.approve_request(id, code, actor).await
    }

    async fn reject_request(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Option<AccessRequest>, StoreError> {
        self.inner.reject_request(id, actor, notes).await
    }

    async fn cancel_access(
        &self,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<Option<AccessRequest>, StoreError> {
        self.inner.cancel_access(id, agency_id, actor).await
    }

    async fn mark_code_used(
        &self,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<AccessRequest>, StoreError> {
        self.inner.mark_code_used(id, agency_id).await
    }

    async fn complete_signup(&self, record: SignupRecord) -> Result<SignupRows, StoreError> {
        self.inner.complete_signup(record).await
    }

    async fn find_agency(&self, id: Uuid) -> Result<Option<Agency>, StoreError> {
        self.inner.find_agency(id).await
    }

    async fn update_branding(
        &self,
        id: Uuid,
        branding: &Branding,
    ) -> Result<Option<Agency>, StoreError> {
        self.inner.update_branding(id, branding).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn touch_user_login(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.touch_user_login(id).await
    }

    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Identity, StoreError> {
        self.inner.create_identity(email, password_hash).await
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity_by_email(email).await
    }

    async fn delete_identity(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_identity(id).await
    }

    async fn insert_document(&self, data: NewDocument) -> Result<TenantDocument, StoreError> {
        self.inner.insert_document(data).await
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<TenantDocument>, StoreError> {
        self.inner.get_document(collection, id).await
    }

    async fn query_documents(&self, query: &ScopedQuery) -> Result<Vec<TenantDocument>, StoreError> {
        self.inner.query_documents(query).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
        data: JsonValue,
    ) -> Result<Option<TenantDocument>, StoreError> {
        self.inner.update_document(collection, id, agency_id, data).await
    }

    async fn delete_document(
        &self,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.inner.delete_document(collection, id, agency_id).await
    }
}

#[tokio::test]
async fn test_example_scenarios() {
    let h = harness();

    // 1. Submitted requests start pending
    let request = h.access.submit_request(acme()).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    // 2. Approval issues an unused code
    let approved = h.access.approve(request.id, "platform-admin").await.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    let code = approved.approval_code.clone().unwrap();
    assert!(is_approval_code_format(&code));
    assert!(!approved.code_used);

    // 3. Matching email validates
    assert!(h.access.validate_approval_code(&code, "a@acme.com").await.is_valid());

    // 4. Different email is rejected
    assert_eq!(
        h.access
            .validate_approval_code(&code, "wrong@acme.com")
            .await
            .error(),
        Some(CodeErrorKind::EmailMismatch)
    );

    // 5. Redeemed codes are reported as used
    h.signup
        .complete_signup(&code, "a@acme.com", credentials())
        .await
        .unwrap();
    assert_eq!(
        h.access
            .validate_approval_code(&code, "a@acme.com")
            .await
            .error(),
        Some(CodeErrorKind::CodeUsed)
    );

    // 6. Rejection stores notes and no code
    let other = h.access.submit_request(acme()).await.unwrap();
    let rejected = h
        .access
        .reject(other.id, "platform-admin", Some("insufficient info".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.rejection_notes.as_deref(), Some("insufficient info"));
    assert!(rejected.approval_code.is_none());
}

#[tokio::test]
async fn test_lookup_outage_is_retryable_validation_error() {
    let store = Arc::new(CodeLookupOutage {
        inner: MemoryStore::new(),
    });
    let access = AccessService::new(store.clone());
    let request = access.submit_request(acme()).await.unwrap();
    let code = access
        .approve(request.id, "admin")
        .await
        .unwrap()
        .approval_code
        .unwrap();

    let outcome = access.validate_approval_code(&code, "a@acme.com").await;
    assert!(!outcome.is_valid());
    assert_eq!(outcome.error(), Some(CodeErrorKind::ValidationError));
    assert!(CodeErrorKind::ValidationError.is_retryable());

    // Signup stops before creating an identity
    let identities = Arc::new(PasswordIdentityProvider::new(store.clone()));
    let signup = SignupService::new(access.clone(), identities);
    let err = signup
        .complete_signup(&code, "a@acme.com", credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, SignupError::Rejected(CodeErrorKind::ValidationError)));
    assert!(store
        .find_identity_by_email("a@acme.com")
        .await
        .unwrap()
        .is_none());
    assert!(!access.get_request(request.id).await.unwrap().code_used);
}

#[tokio::test]
async fn test_email_comparison_ignores_case() {
    let h = harness();
    let mut data = acme();
    data.contact_email = "Foo@Bar.com".to_string();
    let request = h.access.submit_request(data).await.unwrap();
    let code = h
        .access
        .approve(request.id, "admin")
        .await
        .unwrap()
        .approval_code
        .unwrap();

    assert!(h.access.validate_approval_code(&code, "foo@bar.com").await.is_valid());
}

#[tokio::test]
async fn test_only_legal_edges_are_reachable() {
    let h = harness();
    let all = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
    ];

    for from in all {
        for to in all {
            let legal = matches!(
                (from, to),
                (RequestStatus::Pending, RequestStatus::Approved)
                    | (RequestStatus::Pending, RequestStatus::Rejected)
                    | (RequestStatus::Approved, RequestStatus::Cancelled)
            );
            assert_eq!(from.can_transition_to(to), legal, "{from} -> {to}");
        }
    }

    // Rejected is terminal through the service as well
    let request = h.access.submit_request(acme()).await.unwrap();
    h.access.reject(request.id, "admin", None).await.unwrap();
    assert!(matches!(
        h.access.approve(request.id, "admin").await,
        Err(AccessError::InvalidState { .. })
    ));
    assert!(matches!(
        h.access.reject(request.id, "admin", None).await,
        Err(AccessError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_every_approval_gets_a_fresh_code() {
    let h = harness();
    let mut codes = std::collections::HashSet::new();
    for _ in 0..20 {
        let request = h.access.submit_request(acme()).await.unwrap();
        let approved = h.access.approve(request.id, "admin").await.unwrap();
        assert!(codes.insert(approved.approval_code.unwrap()));
    }
}

#[tokio::test]
async fn test_concurrent_approvals_issue_one_code() {
    let h = harness();
    let request = h.access.submit_request(acme()).await.unwrap();

    let results = join_all((0..8).map(|i| {
        let access = h.access.clone();
        async move { access.approve(request.id, &format!("admin-{i}")).await }
    }))
    .await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);

    let stored = h.access.get_request(request.id).await.unwrap();
    assert_eq!(stored.approval_code, winners[0].approval_code);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signups_create_one_agency() {
    let h = harness();
    let request = h.access.submit_request(acme()).await.unwrap();
    let code = h
        .access
        .approve(request.id, "admin")
        .await
        .unwrap()
        .approval_code
        .unwrap();

    let attempts = (0..6).map(|_| {
        let signup = h.signup.clone();
        let code = code.clone();
        tokio::spawn(async move {
            signup
                .complete_signup(&code, "a@acme.com", credentials())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                result,
                SignupError::Rejected(CodeErrorKind::CodeUsed) | SignupError::IdentityConflict
            ),
            "unexpected error: {result}"
        );
    }

    assert_eq!(h.store.agency_count().await, 1);
    assert_eq!(h.store.identity_count().await, 1);
}

/// Hands out a distinct identity per call so every racer reaches the
/// redemption write
#[derive(Default)]
struct UniqueIdentities {
    created: tokio::sync::Mutex<Vec<Uuid>>,
    deleted: tokio::sync::Mutex<Vec<Uuid>>,
}

#[async_trait::async_trait]
impl IdentityProvider for UniqueIdentities {
    async fn create_identity(&self, email: &str, _password: &str) -> Result<Identity, IdentityError> {
        let id = Uuid::new_v4();
        self.created.lock().await.push(id);
        Ok(Identity {
            id,
            email: format!("{}+{}", Uuid::new_v4().simple(), email),
            password_hash: String::new(),
            created_at: chrono::Utc::now(),
        })
    }

    async fn authenticate(&self, _email: &str, _password: &str) -> Result<Identity, IdentityError> {
        Err(IdentityError::InvalidCredentials)
    }

    async fn delete_identity(&self, id: Uuid) -> Result<(), IdentityError> {
        self.deleted.lock().await.push(id);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_losing_signups_are_compensated() {
    let store = Arc::new(MemoryStore::new());
    let access = AccessService::new(store.clone());
    let identities = Arc::new(UniqueIdentities::default());
    let signup = SignupService::new(access.clone(), identities.clone());

    let request = access.submit_request(acme()).await.unwrap();
    let code = access
        .approve(request.id, "admin")
        .await
        .unwrap()
        .approval_code
        .unwrap();

    let attempts = (0..5).map(|_| {
        let signup = signup.clone();
        let code = code.clone();
        tokio::spawn(async move {
            signup
                .complete_signup(&code, "a@acme.com", credentials())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    let losers = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(losers, 4);
    assert_eq!(store.agency_count().await, 1);

    // Every identity except the winner's was removed again
    let created = identities.created.lock().await;
    let deleted = identities.deleted.lock().await;
    assert_eq!(deleted.len(), created.len() - 1);
    assert!(created.contains(&winner.user.id));
    assert!(!deleted.contains(&winner.user.id));
}

#[tokio::test]
async fn test_cancel_revokes_beta_access() {
    let h = harness();
    let request = h.access.submit_request(acme()).await.unwrap();
    let code = h
        .access
        .approve(request.id, "admin")
        .await
        .unwrap()
        .approval_code
        .unwrap();
    let outcome = h
        .signup
        .complete_signup(&code, "a@acme.com", credentials())
        .await
        .unwrap();
    assert!(outcome.agency.beta_access);

    let cancelled = h
        .access
        .cancel_access(request.id, outcome.agency.id, "admin")
        .await
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let agency = h.store.find_agency(outcome.agency.id).await.unwrap().unwrap();
    assert!(!agency.beta_access);
    assert!(agency.beta_granted_at.is_none());

    assert_eq!(
        h.access
            .validate_approval_code(&code, "a@acme.com")
            .await
            .error(),
        Some(CodeErrorKind::NotApproved)
    );
}

#[tokio::test]
async fn test_scoped_get_never_crosses_tenants() {
    let store = Arc::new(MemoryStore::new());
    let documents = TenantDocuments::new(store.clone());
    let agencies: Vec<AgencyId> = (0..3).map(|_| AgencyId::new()).collect();

    let mut ids = Vec::new();
    for agency in &agencies {
        for collection in Collection::ALL {
            let doc = documents
                .create(collection, *agency, serde_json::json!({ "n": 1 }))
                .await
                .unwrap();
            ids.push((collection, doc.id));
        }
    }
    ids.push((Collection::Families, Uuid::new_v4()));

    for caller in &agencies {
        for (collection, id) in &ids {
            match documents.get(*collection, *id, *caller).await {
                Ok(doc) => assert_eq!(doc.agency_id, caller.as_uuid()),
                Err(e) => assert!(matches!(e, TenantError::NotFoundOrUnauthorized)),
            }
        }
    }
}

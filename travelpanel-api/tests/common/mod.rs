/// Common test utilities for integration tests
///
/// Every context runs the full router over a fresh in-memory store, so tests
/// need no database and never share state.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service as _;
use travelpanel_api::app::{build_router, AppState, ADMIN_KEY_HEADER};
use travelpanel_api::config::{
    AdminConfig, ApiConfig, Config, JwtConfig, RateLimitConfig, StorageBackend, StorageConfig,
};
use travelpanel_shared::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use travelpanel_shared::models::agency::{Agency, Branding};
use travelpanel_shared::models::document::{Collection, NewDocument, TenantDocument};
use travelpanel_shared::models::identity::Identity;
use travelpanel_shared::models::user::User;
use travelpanel_shared::store::{MemoryStore, SignupRecord, SignupRows, Store, StoreError};
use travelpanel_shared::tenant::ScopedQuery;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "test-admin-key-at-least-32-bytes-long";
pub const PASSWORD: &str = "Sunr1se!Tours";

pub fn test_config(signup_per_minute: u32) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            production: false,
            cors_origins: vec!["*".to_string()],
            public_origin: "https://app.travelpanel.test".to_string(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-at-least-32-bytes-long".to_string(),
        },
        admin: AdminConfig {
            api_key: ADMIN_KEY.to_string(),
        },
        rate_limit: RateLimitConfig {
            signup_per_minute,
            trust_proxy: false,
        },
    }
}

/// Test context holding the router and its store
pub struct TestContext {
    pub app: axum::Router,
    pub store: Arc<MemoryStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_rate_limit(100)
    }

    pub fn with_rate_limit(signup_per_minute: u32) -> Self {
        Self::with_config(test_config(signup_per_minute))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config);
        Self {
            app: build_router(state),
            store,
        }
    }

    /// Router whose approval-code lookups fail with a pool timeout
    pub fn with_code_lookup_outage() -> Self {
        let store = Arc::new(MemoryStore::new());
        let outage = Arc::new(CodeLookupOutage {
            inner: store.clone(),
        });
        let state = AppState::new(outage, test_config(100));
        Self {
            app: build_router(state),
            store,
        }
    }

    /// Sends one request through the router
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().call(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .header("X-Admin-Actor", "ops@travelpanel.test");
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        read_json(self.send(request).await).await
    }

    pub async fn authed(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token));
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        read_json(self.send(request).await).await
    }

    /// Submits and approves a request; returns its id and code
    pub async fn approved_request(&self, agency: &str, email: &str) -> (String, String) {
        let (status, submitted) = self
            .post_json(
                "/v1/access-requests",
                serde_json::json!({ "agencyName": agency, "contactEmail": email }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{submitted}");
        let id = submitted["id"].as_str().unwrap().to_string();

        let (status, approved) = self
            .admin("POST", &format!("/v1/admin/access-requests/{id}/approve"), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{approved}");
        let code = approved["approvalCode"].as_str().unwrap().to_string();
        (id, code)
    }

    /// Runs the whole onboarding flow; returns the signup response body
    pub async fn onboard(&self, agency: &str, email: &str) -> Value {
        let (_, code) = self.approved_request(agency, email).await;
        let (status, body) = self
            .post_json(
                "/v1/signup",
                serde_json::json!({ "code": code, "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

/// Builds a code check arriving from `peer`, optionally with `X-Forwarded-For`
pub fn code_check_from(peer: &str, forwarded: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/v1/access-requests/validate")
        .header("content-type", "application/json");
    if let Some(forwarded) = forwarded {
        builder = builder.header("x-forwarded-for", forwarded);
    }
    let mut request = builder
        .body(Body::from(
            serde_json::json!({ "code": "TP-AAAAAA", "email": "a@b.com" }).to_string(),
        ))
        .unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

/// Reads a response as JSON (`Null` for empty bodies)
pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return (status, Value::Null);
    }
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Store whose approval-code lookups fail as if the pool were exhausted
pub struct CodeLookupOutage {
    inner: Arc<MemoryStore>,
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
        data: Value,
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

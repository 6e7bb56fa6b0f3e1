/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use travelpanel_api::{app::AppState, config::Config};
/// use travelpanel_shared::store::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(MemoryStore::new()), config);
/// let app = travelpanel_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        rate_limit::{rate_limit_layer, RateLimit, RateLimiter},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use travelpanel_shared::{
    access::AccessService,
    auth::{
        admin::{normalize_actor, AdminKey},
        identity::{IdentityProvider, PasswordIdentityProvider},
        jwt, AuthContext,
    },
    signup::SignupService,
    store::Store,
    tenant::TenantDocuments,
};

/// Header carrying the platform admin key
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Header naming the acting admin (recorded as `approved_by` etc.)
pub const ADMIN_ACTOR_HEADER: &str = "X-Admin-Actor";

/// Acting platform admin, set by [`admin_auth_layer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminActor(pub String);

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub access: AccessService,
    pub signup: SignupService,
    pub documents: TenantDocuments,
    pub identities: Arc<dyn IdentityProvider>,
    pub admin_key: Arc<AdminKey>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services over one store
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let access = AccessService::new(store.clone());
        let identities: Arc<dyn IdentityProvider> =
            Arc::new(PasswordIdentityProvider::new(store.clone()));
        let signup = SignupService::new(access.clone(), identities.clone());
        let documents = TenantDocuments::new(store.clone());
        let admin_key = Arc::new(AdminKey::new(&config.admin.api_key));
        let rate_limiter =
            RateLimiter::new(RateLimit::per_minute(config.rate_limit.signup_per_minute));

        Self {
            store,
            access,
            signup,
            documents,
            identities,
            admin_key,
            rate_limiter,
            config: Arc::new(config),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                               # Health check (public)
/// └── /v1/
///     ├── POST /access-requests             # Submit a request (public)
///     ├── POST /access-requests/validate    # Check a code (public, rate limited)
///     ├── POST /signup                      # Redeem a code (public, rate limited)
///     ├── /auth/                            # login (rate limited), refresh
///     ├── /admin/access-requests/           # Platform admin (X-Admin-Key)
///     │   ├── GET  /                        # List, ?status=
///     │   ├── GET  /stream                  # SSE snapshot + live changes
///     │   ├── GET  /:id                     # Detail with signup link
///     │   └── POST /:id/{approve,reject,cancel}
///     ├── /agency                           # Caller's agency (JWT)
///     │   └── PUT /branding                 # Agency admins only
///     └── /collections/:collection[/:id]    # Tenant documents (JWT)
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication and rate limiting (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Code guessing surface
    let limited_routes = Router::new()
        .route(
            "/access-requests/validate",
            post(routes::access_requests::validate_code),
        )
        .route("/signup", post(routes::signup::signup))
        .route("/auth/login", post(routes::auth::login))
        .layer(from_fn_with_state(state.clone(), rate_limit_layer));

    let public_routes = Router::new()
        .route("/access-requests", post(routes::access_requests::submit))
        .route("/auth/refresh", post(routes::auth::refresh));

    let admin_routes = Router::new()
        .route("/access-requests", get(routes::admin::list_requests))
        .route("/access-requests/stream", get(routes::admin::stream_requests))
        .route("/access-requests/:id", get(routes::admin::get_request))
        .route("/access-requests/:id/approve", post(routes::admin::approve))
        .route("/access-requests/:id/reject", post(routes::admin::reject))
        .route("/access-requests/:id/cancel", post(routes::admin::cancel))
        .layer(from_fn_with_state(state.clone(), admin_auth_layer));

    let tenant_routes = Router::new()
        .route("/agency", get(routes::agency::get_agency))
        .route("/agency/branding", put(routes::agency::update_branding))
        .route(
            "/collections/:collection",
            get(routes::collections::list).post(routes::collections::create),
        )
        .route(
            "/collections/:collection/:id",
            get(routes::collections::get)
                .put(routes::collections::update)
                .delete(routes::collections::delete),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .merge(limited_routes)
        .merge(public_routes)
        .nest("/admin", admin_routes)
        .merge(tenant_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-admin-key"),
                header::HeaderName::from_static("x-admin-actor"),
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer access token and injects [`AuthContext`] into the
/// request extensions. The agency in the context comes from the token only.
pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let claims = jwt::validate_access_token(token, state.jwt_secret())?;
    req.extensions_mut().insert(AuthContext::from_claims(&claims));

    Ok(next.run(req).await)
}

/// Platform admin middleware layer
///
/// Requires `X-Admin-Key` to match the configured key (constant-time) and
/// records the actor from `X-Admin-Actor`.
pub async fn admin_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing admin key".to_string()))?;

    if !state.admin_key.verify(presented) {
        tracing::warn!(path = %req.uri().path(), "Rejected admin key");
        return Err(ApiError::Unauthorized("Invalid admin key".to_string()));
    }

    let actor = normalize_actor(
        req.headers()
            .get(ADMIN_ACTOR_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    req.extensions_mut().insert(AdminActor(actor));

    Ok(next.run(req).await)
}

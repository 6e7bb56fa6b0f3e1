/// Authentication endpoints
///
/// Agency users log in with the identity created at signup and receive an
/// access/refresh token pair scoped to their agency.
///
/// # Endpoints
///
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use travelpanel_shared::{
    auth::jwt::{self, TokenPair},
    models::user::User,
};
use uuid::Uuid;
use validator::Validate;

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub tokens: TokenPair,
}

/// Token refresh request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// {
///   "email": "a@acme.com",
///   "password": "Sunr1se!Tours"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Malformed email
/// - `401 Unauthorized`: Invalid credentials, or no agency user for them
/// - `403 Forbidden`: User is deactivated
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let identity = state.identities.authenticate(&req.email, &req.password).await?;

    // An identity whose signup never completed has no agency to log into
    let user = active_user(&state, identity.id).await?;

    state.store.touch_user_login(user.id).await?;
    let tokens = jwt::issue_token_pair(user.id, user.agency_id, user.role, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, agency_id = %user.agency_id, "User logged in");

    Ok(Json(LoginResponse { user, tokens }))
}

/// Token refresh endpoint
///
/// The user is looked up again so a deactivated account cannot keep
/// refreshing. Role and agency come from the stored user, not the old token.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/refresh
///
/// { "refreshToken": "eyJ..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token, or unknown user
/// - `403 Forbidden`: User is deactivated
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;
    let user = active_user(&state, claims.sub).await?;

    let tokens = jwt::issue_token_pair(user.id, user.agency_id, user.role, state.jwt_secret())?;
    Ok(Json(tokens))
}

async fn active_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    let user = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Forbidden("This account has been deactivated".to_string()));
    }
    Ok(user)
}

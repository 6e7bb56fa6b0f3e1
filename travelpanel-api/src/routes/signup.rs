/// Signup endpoint
///
/// Redeems an approval code: creates the agency, its admin user and a token
/// pair in one call.
///
/// # Endpoint
///
/// ```text
/// POST /v1/signup
/// Content-Type: application/json
///
/// {
///   "code": "TP-AB12CD",
///   "email": "a@acme.com",
///   "password": "Sunr1se!Tours",
///   "name": "Ada Owner"
/// }
/// ```
///
/// # Errors
///
/// Rejected codes answer with the code error kind and a remedy:
///
/// - `400 CODE_MISSING`, `404 CODE_INVALID`
/// - `409 NOT_APPROVED`, `409 CODE_USED`
/// - `403 EMAIL_MISMATCH`, `503 VALIDATION_ERROR`
///
/// Otherwise:
///
/// - `422 Unprocessable Entity`: Weak password
/// - `409 Conflict`: Email already has an account

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use travelpanel_shared::auth::jwt::{issue_token_pair, TokenPair};
use travelpanel_shared::models::agency::Agency;
use travelpanel_shared::models::user::User;
use travelpanel_shared::signup::SignupCredentials;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub code: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub agency: Agency,
    pub user: User,
    pub tokens: TokenPair,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let outcome = state
        .signup
        .complete_signup(
            &req.code,
            &req.email,
            SignupCredentials {
                password: req.password,
                name: req.name,
            },
        )
        .await?;

    let tokens = issue_token_pair(
        outcome.user.id,
        outcome.agency.id,
        outcome.user.role,
        state.jwt_secret(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            agency: outcome.agency,
            user: outcome.user,
            tokens,
        }),
    ))
}

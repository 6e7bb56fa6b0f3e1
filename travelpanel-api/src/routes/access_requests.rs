/// Public access-request endpoints
///
/// - `POST /v1/access-requests` - Ask for beta access
/// - `POST /v1/access-requests/validate` - Check an approval code before signup

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use travelpanel_shared::access::{CodeErrorKind, CodeValidation, Remedy};
use travelpanel_shared::models::access_request::{NewAccessRequest, RequestStatus};
use uuid::Uuid;

/// Submit response; the request's review fields stay private
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Submit an access request
///
/// # Endpoint
///
/// ```text
/// POST /v1/access-requests
/// Content-Type: application/json
///
/// {
///   "agencyName": "Acme Travel",
///   "contactEmail": "a@acme.com",
///   "phoneNumber": "+1 555 0100",
///   "groupType": "school",
///   "message": "We run 20 school trips a year"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Empty agency name or invalid email
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<NewAccessRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let request = state.access.submit_request(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            id: request.id,
            status: request.status,
            created_at: request.created_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCodeRequest {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub email: String,
}

/// Code check result
///
/// Invalid codes carry the error kind, user-facing copy and a next step.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeResponse {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CodeErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<Remedy>,

    /// Agency name from the request, shown on the signup form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
}

impl From<CodeValidation> for ValidateCodeResponse {
    fn from(outcome: CodeValidation) -> Self {
        match outcome {
            CodeValidation::Valid(request) => Self {
                valid: true,
                error: None,
                message: None,
                remedy: None,
                agency_name: Some(request.agency_name),
            },
            CodeValidation::Invalid(rejection) => Self {
                valid: false,
                error: Some(rejection.error),
                remedy: Some(rejection.error.remedy()),
                message: Some(rejection.message),
                agency_name: None,
            },
        }
    }
}

/// Validate an approval code against an email
///
/// Always answers 200; `valid: false` responses explain why.
///
/// # Endpoint
///
/// ```text
/// POST /v1/access-requests/validate
///
/// { "code": "TP-AB12CD", "email": "a@acme.com" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "valid": false,
///   "error": "EMAIL_MISMATCH",
///   "message": "This code was issued to a different email address. ...",
///   "remedy": "contact_support"
/// }
/// ```
pub async fn validate_code(
    State(state): State<AppState>,
    Json(req): Json<ValidateCodeRequest>,
) -> Json<ValidateCodeResponse> {
    let outcome = state
        .access
        .validate_approval_code(req.code.as_deref().unwrap_or(""), &req.email)
        .await;

    Json(outcome.into())
}

/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every shared-crate error converts into
/// [`ApiError`], which renders as `{ "error", "message", "details" }`.
///
/// # Example
///
/// ```
/// use travelpanel_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("Agency not found".to_string()));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use travelpanel_shared::access::{AccessError, CodeErrorKind, Remedy};
use travelpanel_shared::auth::identity::IdentityError;
use travelpanel_shared::auth::jwt::JwtError;
use travelpanel_shared::auth::password::PasswordError;
use travelpanel_shared::signup::SignupError;
use travelpanel_shared::store::StoreError;
use travelpanel_shared::tenant::TenantError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409): wrong status, code already used, duplicate email
    Conflict(String),

    /// Approval code rejected; status depends on the kind
    CodeRejected(CodeErrorKind),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g. "not_found", "CODE_USED")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// What the user should do next (approval-code errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<Remedy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::CodeRejected(kind) => write!(f, "Approval code rejected: {}", kind),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// HTTP status for a rejected approval code
pub fn code_rejection_status(kind: CodeErrorKind) -> StatusCode {
    match kind {
        CodeErrorKind::CodeMissing => StatusCode::BAD_REQUEST,
        CodeErrorKind::CodeInvalid => StatusCode::NOT_FOUND,
        CodeErrorKind::NotApproved | CodeErrorKind::CodeUsed => StatusCode::CONFLICT,
        CodeErrorKind::EmailMismatch => StatusCode::FORBIDDEN,
        CodeErrorKind::ValidationError => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_code, message, remedy, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None, None),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg, None, None)
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None, None),
            ApiError::CodeRejected(kind) => (
                code_rejection_status(kind),
                kind.as_str(),
                kind.message().to_string(),
                Some(kind.remedy()),
                None,
            ),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                None,
                Some(errors),
            ),
            ApiError::RateLimitExceeded {
                retry_after: seconds,
                message,
            } => {
                retry_after = Some(seconds);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_exceeded",
                    message,
                    None,
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                // Logged, never exposed
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            remedy,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(seconds));
        }
        response
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            StoreError::Conflict(constraint) => {
                ApiError::Conflict(format!("Constraint violation: {}", constraint))
            }
            StoreError::CasFailed => {
                ApiError::Conflict("The record was changed concurrently; reload and retry".to_string())
            }
            StoreError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AccessError::InvalidState { .. } | AccessError::AlreadyUsed => {
                ApiError::Conflict(err.to_string())
            }
            AccessError::TenantMismatch => ApiError::Forbidden(err.to_string()),
            AccessError::Validation(errors) => errors.into(),
            AccessError::Storage(e) => e.into(),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            TenantError::TenantMismatch => ApiError::Forbidden(err.to_string()),
            TenantError::NotFoundOrUnauthorized => ApiError::NotFound(err.to_string()),
            TenantError::Storage(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooWeak(msg) => ApiError::ValidationError(vec![ValidationErrorDetail {
                field: "password".to_string(),
                message: msg.to_string(),
            }]),
            other => ApiError::InternalError(format!("Password operation failed: {}", other)),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Conflict => ApiError::Conflict(err.to_string()),
            IdentityError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            IdentityError::Password(e) => e.into(),
            IdentityError::Storage(e) => e.into(),
            IdentityError::Task(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<SignupError> for ApiError {
    fn from(err: SignupError) -> Self {
        match err {
            SignupError::Rejected(kind) => ApiError::CodeRejected(kind),
            SignupError::WeakPassword(e) => e.into(),
            SignupError::IdentityConflict => ApiError::Conflict(err.to_string()),
            SignupError::Identity(e) => e.into(),
            SignupError::Storage(e) => e.into(),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::CreateError(msg) => {
                ApiError::InternalError(format!("Failed to create token: {}", msg))
            }
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

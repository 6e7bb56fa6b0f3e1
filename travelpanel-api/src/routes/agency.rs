/// The caller's own agency
///
/// # Endpoints
///
/// - `GET /v1/agency` - Agency profile, plan and counters
/// - `PUT /v1/agency/branding` - Replace portal branding (agency admins)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use travelpanel_shared::{
    auth::AuthContext,
    models::agency::{Agency, Branding},
};
use validator::Validate;

pub async fn get_agency(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Agency>> {
    let agency = state
        .store
        .find_agency(auth.agency_id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound("Agency not found".to_string()))?;

    Ok(Json(agency))
}

/// Replaces the agency's branding
///
/// # Endpoint
///
/// ```text
/// PUT /v1/agency/branding
/// Authorization: Bearer <token>
///
/// {
///   "primaryColor": "#1a73e8",
///   "logoUrl": "https://cdn.acme.com/logo.png",
///   "portalName": "Acme Trips"
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an agency admin
/// - `422 Unprocessable Entity`: Invalid color, URL or name
pub async fn update_branding(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(branding): Json<Branding>,
) -> ApiResult<Json<Agency>> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "Only agency admins can change branding".to_string(),
        ));
    }
    branding.validate()?;

    let agency = state
        .store
        .update_branding(auth.agency_id.as_uuid(), &branding)
        .await?
        .ok_or_else(|| ApiError::NotFound("Agency not found".to_string()))?;

    tracing::info!(agency_id = %agency.id, user_id = %auth.user_id, "Branding updated");
    Ok(Json(agency))
}

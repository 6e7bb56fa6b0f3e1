/// Tenant-scoped document collections
///
/// Families, groups, payments, quotations, invoices and documents share one
/// CRUD surface. The agency always comes from the caller's token; payloads
/// naming another agency are refused.
///
/// # Endpoints
///
/// - `GET    /v1/collections/:collection?field=op:value&limit=50&order=asc`
/// - `POST   /v1/collections/:collection`
/// - `GET    /v1/collections/:collection/:id`
/// - `PUT    /v1/collections/:collection/:id`
/// - `DELETE /v1/collections/:collection/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use travelpanel_shared::{
    auth::AuthContext,
    models::document::{Collection, TenantDocument},
    tenant::{FilterOp, ScopedQuery},
};
use uuid::Uuid;

fn parse_collection(raw: &str) -> ApiResult<Collection> {
    Collection::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("Unknown collection: {}", raw)))
}

/// Builds a query from `?field=value` pairs
///
/// `limit` and `order` are reserved. A value may carry an operator prefix
/// (`total=gte:250`); values are read as JSON where possible, so `250` is a
/// number and `Lisbon` a string.
fn build_query(
    collection: Collection,
    auth: &AuthContext,
    params: HashMap<String, String>,
) -> ApiResult<ScopedQuery> {
    let mut query = ScopedQuery::new(collection, auth.agency_id);

    // Sorted so the filter order is stable across requests
    let mut params: Vec<_> = params.into_iter().collect();
    params.sort();

    for (key, raw) in params {
        match key.as_str() {
            "limit" => {
                let limit = raw
                    .parse::<i64>()
                    .map_err(|_| ApiError::BadRequest("limit must be an integer".to_string()))?;
                query = query.limit(limit);
            }
            "order" => match raw.as_str() {
                "asc" => query = query.oldest_first(),
                "desc" => {}
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "order must be asc or desc, got {}",
                        other
                    )))
                }
            },
            field => {
                let (op, value) = split_operator(&raw);
                query = query.filter(field, op, parse_value(value))?;
            }
        }
    }

    Ok(query)
}

fn split_operator(raw: &str) -> (FilterOp, &str) {
    raw.split_once(':')
        .and_then(|(prefix, rest)| FilterOp::parse(prefix).map(|op| (op, rest)))
        .unwrap_or((FilterOp::Eq, raw))
}

fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<TenantDocument>>> {
    let query = build_query(parse_collection(&collection)?, &auth, params)?;
    Ok(Json(state.documents.list(&query).await?))
}

/// Creates a document owned by the caller's agency
///
/// # Errors
///
/// - `400 Bad Request`: Payload is not a JSON object
/// - `403 Forbidden`: Payload names a different `agencyId`
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(collection): Path<String>,
    Json(data): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<TenantDocument>)> {
    let doc = state
        .documents
        .create(parse_collection(&collection)?, auth.agency_id, data)
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// Fetches one document
///
/// Documents of other agencies answer 404, same as missing ones.
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((collection, id)): Path<(String, Uuid)>,
) -> ApiResult<Json<TenantDocument>> {
    let doc = state
        .documents
        .get(parse_collection(&collection)?, id, auth.agency_id)
        .await?;
    Ok(Json(doc))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((collection, id)): Path<(String, Uuid)>,
    Json(data): Json<JsonValue>,
) -> ApiResult<Json<TenantDocument>> {
    let doc = state
        .documents
        .update(parse_collection(&collection)?, id, auth.agency_id, data)
        .await?;
    Ok(Json(doc))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((collection, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .documents
        .delete(parse_collection(&collection)?, id, auth.agency_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

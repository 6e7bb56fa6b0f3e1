/// Platform admin endpoints for access requests
///
/// All routes sit behind the admin key (see `app::admin_auth_layer`); the
/// acting admin is recorded on every transition.
///
/// # Endpoints
///
/// - `GET  /v1/admin/access-requests?status=pending` - List, newest first
/// - `GET  /v1/admin/access-requests/stream` - SSE snapshot, then live changes
/// - `GET  /v1/admin/access-requests/:id` - One request with its signup link
/// - `POST /v1/admin/access-requests/:id/approve` - Issue an approval code
/// - `POST /v1/admin/access-requests/:id/reject` - Reject with optional notes
/// - `POST /v1/admin/access-requests/:id/cancel` - Revoke beta access

use crate::{
    app::{AdminActor, AppState},
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt as _;
use travelpanel_shared::access::{signup_link, RequestEvent, RequestEventKind};
use travelpanel_shared::models::access_request::{AccessRequest, RequestStatus};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// A request plus the link the admin sends to the applicant
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: AccessRequest,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signup_link: Option<String>,
}

impl RequestView {
    fn new(state: &AppState, request: AccessRequest) -> Self {
        let signup_link = signup_link(&state.config.api.public_origin, &request);
        Self {
            request,
            signup_link,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub agency_id: Uuid,
}

/// Lists access requests, optionally filtered by status
///
/// # Errors
///
/// - `400 Bad Request`: Unknown status
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<AccessRequest>>> {
    let filter = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            RequestStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {}", raw)))?,
        ),
    };

    Ok(Json(state.access.list_requests(filter).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestView>> {
    let request = state.access.get_request(id).await?;
    Ok(Json(RequestView::new(&state, request)))
}

/// Approves a pending request
///
/// The response carries the new code and the signup link to send.
///
/// # Errors
///
/// - `404 Not Found`: Unknown request
/// - `409 Conflict`: Request is not pending
pub async fn approve(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestView>> {
    let request = state.access.approve(id, &actor).await?;
    Ok(Json(RequestView::new(&state, request)))
}

/// Rejects a pending request
///
/// The body is optional: `{ "notes": "..." }`.
pub async fn reject(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<AccessRequest>> {
    let notes = body.and_then(|Json(b)| b.notes);
    Ok(Json(state.access.reject(id, &actor, notes).await?))
}

/// Cancels a redeemed request and revokes the agency's beta access
///
/// # Errors
///
/// - `403 Forbidden`: `agencyId` is not the agency that redeemed the code
/// - `409 Conflict`: Request is not approved and redeemed
pub async fn cancel(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<Json<AccessRequest>> {
    Ok(Json(
        state.access.cancel_access(id, body.agency_id, &actor).await?,
    ))
}

/// Live request list for the admin console
///
/// # SSE Event Format
///
/// ```text
/// event: snapshot
/// data: [{...request...}, ...]
///
/// event: approved
/// data: {"kind":"approved","request":{...},"at":"2026-01-01T00:00:00Z"}
/// ```
///
/// Live event names are the change kinds (`submitted`, `approved`,
/// `rejected`, `cancelled`, `code_used`). A `resync` event means the client
/// fell behind and missed changes; it should reconnect for a new snapshot.
pub async fn stream_requests(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading so nothing falls between snapshot and tail
    let receiver = state.access.subscribe();
    let snapshot = state.access.list_requests(None).await?;

    tracing::debug!(count = snapshot.len(), "Admin request stream opened");

    let live = BroadcastStream::new(receiver).map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(event) => json_event(event_name(event.kind), &event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Admin request stream lagged");
                Event::default().event("resync").data(missed.to_string())
            }
        })
    });

    let stream = tokio_stream::once(Ok::<_, Infallible>(json_event("snapshot", &snapshot))).chain(live);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(25))))
}

fn event_name(kind: RequestEventKind) -> &'static str {
    match kind {
        RequestEventKind::Submitted => "submitted",
        RequestEventKind::Approved => "approved",
        RequestEventKind::Rejected => "rejected",
        RequestEventKind::Cancelled => "cancelled",
        RequestEventKind::CodeUsed => "code_used",
    }
}

fn json_event<T: Serialize>(name: &'static str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, event = name, "Failed to encode SSE event");
            Event::default().event("error").data("encoding failed")
        })
}

/// Access-request operations
///
/// [`AccessService`] owns every state change of an access request. Each
/// change is a conditional write in storage, so two admins acting on the
/// same request at once cannot both succeed, and an approval code can be
/// redeemed only once. Successful changes are published to subscribers.

use super::code::{generate_approval_code, normalize_code};
use super::error::AccessError;
use super::validation::{evaluate_code, CodeErrorKind, CodeValidation};
use crate::models::access_request::{AccessRequest, NewAccessRequest, RequestStatus};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Attempts at issuing a unique approval code before giving up
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Most requests returned by one listing
pub const LIST_LIMIT: i64 = 1000;

const EVENT_CAPACITY: usize = 256;

/// What happened to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEventKind {
    Submitted,
    Approved,
    Rejected,
    Cancelled,
    CodeUsed,
}

/// A change to one request, as seen by live subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub kind: RequestEventKind,
    pub request: AccessRequest,
    pub at: DateTime<Utc>,
}

/// Builds `<origin>/signup?code=..&email=..` for an approved request
///
/// Returns `None` if the request has no approval code.
pub fn signup_link(origin: &str, request: &AccessRequest) -> Option<String> {
    let code = request.approval_code.as_deref()?;
    Some(format!(
        "{}/signup?code={}&email={}",
        origin.trim_end_matches('/'),
        urlencoding::encode(code),
        urlencoding::encode(&request.contact_email)
    ))
}

/// Access-request state machine over a [`Store`]
#[derive(Clone)]
pub struct AccessService {
    store: Arc<dyn Store>,
    events: broadcast::Sender<RequestEvent>,
}

impl AccessService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Live feed of request changes
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    /// Records a new pending request
    ///
    /// # Errors
    ///
    /// `Validation` for an empty or overlong agency name or an invalid email.
    pub async fn submit_request(&self, data: NewAccessRequest) -> Result<AccessRequest, AccessError> {
        let data = data.normalized();
        data.validate()?;

        let request = self.store.insert_request(data).await?;

        info!(
            request_id = %request.id,
            agency_name = %request.agency_name,
            "Access request submitted"
        );
        self.publish(RequestEventKind::Submitted, &request);
        Ok(request)
    }

    pub async fn get_request(&self, id: Uuid) -> Result<AccessRequest, AccessError> {
        self.store
            .find_request(id)
            .await?
            .ok_or(AccessError::NotFound(id))
    }

    /// Lists requests, newest first
    pub async fn list_requests(
        &self,
        filter: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>, AccessError> {
        Ok(self.store.list_requests(filter, LIST_LIMIT, 0).await?)
    }

    /// Approves a pending request and issues a fresh approval code
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request does not exist
    /// - `InvalidState` if it is not pending (including when another admin
    ///   acted on it first)
    /// - `Storage` if no unique code could be issued in `MAX_CODE_ATTEMPTS`
    pub async fn approve(&self, id: Uuid, actor: &str) -> Result<AccessRequest, AccessError> {
        self.get_request(id)
            .await?
            .check_transition(RequestStatus::Approved)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let code = generate_approval_code();

            match self.store.approve_request(id, &code, actor).await {
                Ok(Some(request)) => {
                    info!(request_id = %id, actor = %actor, "Access request approved");
                    self.publish(RequestEventKind::Approved, &request);
                    return Ok(request);
                }
                Ok(None) => return Err(self.lost_race(id, RequestStatus::Approved.action()).await),
                Err(e) if e.is_conflict() && attempt < MAX_CODE_ATTEMPTS => {
                    warn!(request_id = %id, attempt, "Approval code collision, regenerating");
                }
                Err(e) => {
                    error!(request_id = %id, error = %e, "Failed to approve access request");
                    return Err(e.into());
                }
            }
        }
    }

    /// Rejects a pending request
    pub async fn reject(
        &self,
        id: Uuid,
        actor: &str,
        notes: Option<String>,
    ) -> Result<AccessRequest, AccessError> {
        self.get_request(id)
            .await?
            .check_transition(RequestStatus::Rejected)?;

        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let Some(request) = self
            .store
            .reject_request(id, actor, notes.as_deref())
            .await?
        else {
            return Err(self.lost_race(id, RequestStatus::Rejected.action()).await);
        };

        info!(request_id = %id, actor = %actor, "Access request rejected");
        self.publish(RequestEventKind::Rejected, &request);
        Ok(request)
    }

    /// Withdraws access from an agency created through this request
    ///
    /// Marks the request cancelled and clears the agency's beta access in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request does not exist
    /// - `InvalidState` unless the request is approved and already redeemed
    /// - `TenantMismatch` if it was redeemed by a different agency
    pub async fn cancel_access(
        &self,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<AccessRequest, AccessError> {
        let current = self.get_request(id).await?;
        current.check_transition(RequestStatus::Cancelled)?;

        match current.agency_id {
            Some(bound) if bound != agency_id => {
                warn!(
                    request_id = %id,
                    agency_id = %agency_id,
                    bound_agency_id = %bound,
                    "Cancel names a different agency than the request is bound to"
                );
                return Err(AccessError::TenantMismatch);
            }
            Some(_) => {}
            None => {
                return Err(AccessError::InvalidState {
                    from: current.status,
                    action: "cancel unredeemed access",
                })
            }
        }

        let Some(request) = self.store.cancel_access(id, agency_id, actor).await? else {
            return Err(self.lost_race(id, RequestStatus::Cancelled.action()).await);
        };

        info!(
            request_id = %id,
            agency_id = %agency_id,
            actor = %actor,
            "Access cancelled, beta access revoked"
        );
        self.publish(RequestEventKind::Cancelled, &request);
        Ok(request)
    }

    /// Checks an approval code against the email it was issued to
    ///
    /// Never fails: storage errors become `VALIDATION_ERROR`, which callers
    /// may retry.
    pub async fn validate_approval_code(&self, code: &str, email: &str) -> CodeValidation {
        let code = normalize_code(code);
        if code.is_empty() {
            return CodeErrorKind::CodeMissing.into();
        }

        let found = match self.store.find_request_by_code(&code).await {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "Approval code lookup failed");
                return CodeErrorKind::ValidationError.into();
            }
        };

        let outcome = evaluate_code(found, email);
        if let Some(kind) = outcome.error() {
            debug!(error = %kind, "Approval code rejected");
        }
        outcome
    }

    /// Redeems an approval code and binds the request to `agency_id`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request does not exist
    /// - `InvalidState` if it is not approved
    /// - `AlreadyUsed` if the code was redeemed before, even by the same agency
    pub async fn mark_code_as_used(
        &self,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<AccessRequest, AccessError> {
        let current = self.get_request(id).await?;
        redeemable(&current)?;

        let Some(request) = self.store.mark_code_used(id, agency_id).await? else {
            let current = self.get_request(id).await?;
            redeemable(&current)?;
            return Err(AccessError::InvalidState {
                from: current.status,
                action: "redeem",
            });
        };

        info!(request_id = %id, agency_id = %agency_id, "Approval code redeemed");
        self.publish(RequestEventKind::CodeUsed, &request);
        Ok(request)
    }

    /// Publishes a change made outside this service (signup)
    pub fn notify(&self, kind: RequestEventKind, request: &AccessRequest) {
        self.publish(kind, request);
    }

    fn publish(&self, kind: RequestEventKind, request: &AccessRequest) {
        // Err only means nobody is listening
        let _ = self.events.send(RequestEvent {
            kind,
            request: request.clone(),
            at: Utc::now(),
        });
    }

    /// Explains why a conditional write matched nothing
    async fn lost_race(&self, id: Uuid, action: &'static str) -> AccessError {
        match self.store.find_request(id).await {
            Ok(Some(current)) => {
                warn!(request_id = %id, status = %current.status, action, "Concurrent update won");
                AccessError::InvalidState {
                    from: current.status,
                    action,
                }
            }
            Ok(None) => AccessError::NotFound(id),
            Err(e) => e.into(),
        }
    }
}

fn redeemable(request: &AccessRequest) -> Result<(), AccessError> {
    if request.status != RequestStatus::Approved {
        return Err(AccessError::InvalidState {
            from: request.status,
            action: "redeem",
        });
    }
    if request.code_used {
        return Err(AccessError::AlreadyUsed);
    }
    Ok(())
}

use crate::models::access_request::RequestStatus;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Failures of access-request operations
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Access request {0} not found")]
    NotFound(Uuid),

    /// The request's current status does not allow the operation
    #[error("Cannot {action}: request is {from}")]
    InvalidState {
        from: RequestStatus,
        action: &'static str,
    },

    #[error("Approval code has already been used")]
    AlreadyUsed,

    /// The request is bound to a different agency than the one named
    #[error("Request belongs to another agency")]
    TenantMismatch,

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

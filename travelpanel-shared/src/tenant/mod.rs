/// Tenant-scoping guard
///
/// Every agency-owned read and write passes through this module. The HTTP
/// layer already derives the caller's agency from their token; the helpers
/// here enforce the same boundary again at the data layer.
///
/// - [`require_agency_id`] rejects a missing or malformed agency context
/// - [`query::ScopedQuery`] always filters by the caller's agency
/// - [`scoped_get`] reports foreign and missing documents identically
/// - [`guard_write`] stamps or checks `agencyId` on outgoing payloads
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use travelpanel_shared::tenant::{guard_write, require_agency_id};
///
/// let agency = require_agency_id(Some("9b2f6a44-6d1c-4c47-9a59-0f6b4f1d2c3e")).unwrap();
/// let mut family = json!({ "lastName": "Okafor" });
/// guard_write(&mut family, agency).unwrap();
/// assert_eq!(family["agencyId"], "9b2f6a44-6d1c-4c47-9a59-0f6b4f1d2c3e");
/// ```

pub mod documents;
pub mod query;

use crate::models::document::{Collection, TenantDocument};
use crate::store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub use documents::TenantDocuments;
pub use query::{FilterOp, ScopedQuery};

/// Payload field that records the owning agency
pub const AGENCY_FIELD: &str = "agencyId";

/// Validated agency identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgencyId(Uuid);

impl AgencyId {
    /// Random ID for a new agency
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AgencyId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AgencyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for AgencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tenant boundary violations
#[derive(Debug, Error)]
pub enum TenantError {
    /// Missing or malformed agency context or payload
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation names an agency other than the caller's
    #[error("Operation targets another agency")]
    TenantMismatch,

    /// The document does not exist or belongs to another agency
    #[error("Document not found")]
    NotFoundOrUnauthorized,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Requires a well-formed agency ID
///
/// # Errors
///
/// Returns `InvalidArgument` when the value is absent, blank or not a UUID.
pub fn require_agency_id(value: Option<&str>) -> Result<AgencyId, TenantError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TenantError::InvalidArgument("agencyId is required".to_string()))?;

    Uuid::parse_str(raw)
        .map(AgencyId)
        .map_err(|_| TenantError::InvalidArgument(format!("'{}' is not a valid agencyId", raw)))
}

/// Stamps or checks the owning agency on a payload about to be written
///
/// An absent or `null` `agencyId` is set to `agency_id`. A present value
/// must name the same agency.
///
/// # Errors
///
/// - `InvalidArgument` if `data` is not a JSON object
/// - `TenantMismatch` if `data` already names another agency
pub fn guard_write(data: &mut JsonValue, agency_id: AgencyId) -> Result<(), TenantError> {
    let object = data.as_object_mut().ok_or_else(|| {
        TenantError::InvalidArgument("document payload must be a JSON object".to_string())
    })?;

    match object.get(AGENCY_FIELD) {
        None | Some(JsonValue::Null) => {}
        Some(JsonValue::String(existing)) if Uuid::parse_str(existing).ok() == Some(agency_id.0) => {}
        Some(_) => return Err(TenantError::TenantMismatch),
    }

    object.insert(
        AGENCY_FIELD.to_string(),
        JsonValue::String(agency_id.to_string()),
    );
    Ok(())
}

/// Fetches one document owned by `agency_id`
///
/// # Errors
///
/// Returns `NotFoundOrUnauthorized` both when the document does not exist and
/// when it belongs to another agency, so callers cannot probe for foreign IDs.
pub async fn scoped_get(
    store: &dyn Store,
    collection: Collection,
    id: Uuid,
    agency_id: AgencyId,
) -> Result<TenantDocument, TenantError> {
    match store.get_document(collection, id).await? {
        Some(doc) if doc.agency_id == agency_id.0 => Ok(doc),
        Some(_) => {
            tracing::warn!(
                document_id = %id,
                agency_id = %agency_id,
                collection = %collection,
                "Cross-tenant read blocked"
            );
            Err(TenantError::NotFoundOrUnauthorized)
        }
        None => Err(TenantError::NotFoundOrUnauthorized),
    }
}

/// Access request model and database operations
///
/// An access request is a prospective agency's application for a platform
/// account. Requests are owned by the platform, not by any tenant.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE request_status AS ENUM ('pending', 'approved', 'rejected', 'cancelled');
///
/// CREATE TABLE agency_requests (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     agency_name VARCHAR(200) NOT NULL,
///     contact_email VARCHAR(255) NOT NULL, -- stored lowercase
///     status request_status NOT NULL DEFAULT 'pending',
///     approval_code VARCHAR(16),
///     code_used BOOLEAN NOT NULL DEFAULT FALSE,
///     agency_id UUID,
///     ...
/// );
/// ```
///
/// # State changes
///
/// Every mutating query here is a conditional update: the `WHERE` clause
/// carries the expected current state and the query returns `None` when the
/// row did not match. Callers decide whether that means "missing" or "wrong
/// state" by re-reading the row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Columns returned by every query in this module
const COLUMNS: &str = "id, agency_name, contact_email, phone_number, group_type, message, \
    status, approval_code, code_used, agency_id, created_at, approved_at, approved_by, \
    rejected_at, rejected_by, rejection_notes, cancelled_at, cancelled_by, code_used_at";

/// Lifecycle status of an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Submitted, waiting for an admin decision
    Pending,

    /// Approved; an approval code has been issued
    Approved,

    /// Rejected by an admin (terminal)
    Rejected,

    /// Access revoked after approval (terminal)
    Cancelled,
}

impl RequestStatus {
    /// Converts status to its storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Parses status from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective agency's request for platform access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    /// Unique request ID
    pub id: Uuid,

    /// Name of the agency asking for access
    pub agency_name: String,

    /// Contact email; the signup email must match it (case-insensitive)
    pub contact_email: String,

    pub phone_number: Option<String>,

    /// Kind of groups the agency runs (e.g. "school", "pilgrimage")
    pub group_type: Option<String>,

    /// Free-text message from the applicant
    pub message: Option<String>,

    /// Current lifecycle status
    pub status: RequestStatus,

    /// Single-use approval code (`TP-XXXXXX`), present once approved
    pub approval_code: Option<String>,

    /// Whether the approval code has been redeemed
    pub code_used: bool,

    /// Agency created from this request, set when the code is redeemed
    pub agency_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub code_used_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Builds a fresh pending request (used by stores that do not generate rows server-side)
    pub fn pending(data: NewAccessRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            agency_name: data.agency_name,
            contact_email: data.contact_email,
            phone_number: data.phone_number,
            group_type: data.group_type,
            message: data.message,
            status: RequestStatus::Pending,
            approval_code: None,
            code_used: false,
            agency_id: None,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_notes: None,
            cancelled_at: None,
            cancelled_by: None,
            code_used_at: None,
        }
    }
}

/// Input for submitting a new access request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessRequest {
    #[validate(length(min = 1, max = 200, message = "Agency name must be 1-200 characters"))]
    pub agency_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: String,

    #[validate(length(max = 50, message = "Phone number must be at most 50 characters"))]
    pub phone_number: Option<String>,

    #[validate(length(max = 100, message = "Group type must be at most 100 characters"))]
    pub group_type: Option<String>,

    #[validate(length(max = 5000, message = "Message must be at most 5000 characters"))]
    pub message: Option<String>,
}

impl NewAccessRequest {
    /// Trims text fields and lowercases the contact email
    pub fn normalized(mut self) -> Self {
        self.agency_name = self.agency_name.trim().to_string();
        self.contact_email = self.contact_email.trim().to_lowercase();
        self.phone_number = self.phone_number.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        self.group_type = self.group_type.map(|g| g.trim().to_string()).filter(|g| !g.is_empty());
        self.message = self.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
        self
    }
}

impl AccessRequest {
    /// Inserts a new pending request
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewAccessRequest,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO agency_requests (agency_name, contact_email, phone_number, group_type, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(data.agency_name)
            .bind(data.contact_email)
            .bind(data.phone_number)
            .bind(data.group_type)
            .bind(data.message)
            .fetch_one(executor)
            .await
    }

    /// Finds a request by ID
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM agency_requests WHERE id = $1");

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds a request by its approval code (exact match, codes are stored uppercase)
    pub async fn find_by_code<'e, E: PgExecutor<'e>>(
        executor: E,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM agency_requests WHERE approval_code = $1");

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(code)
            .fetch_optional(executor)
            .await
    }

    /// Lists requests, newest first, optionally filtered by status
    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM agency_requests
            WHERE ($1::request_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Moves a pending request to approved with the given code
    ///
    /// Returns `None` if the request does not exist or is no longer pending.
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if `code` is already taken.
    pub async fn approve<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        code: &str,
        actor: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agency_requests
            SET status = 'approved', approval_code = $2, code_used = FALSE,
                approved_by = $3, approved_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(id)
            .bind(code)
            .bind(actor)
            .fetch_optional(executor)
            .await
    }

    /// Moves a pending request to rejected
    ///
    /// Returns `None` if the request does not exist or is no longer pending.
    pub async fn reject<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agency_requests
            SET status = 'rejected', rejected_by = $2, rejection_notes = $3, rejected_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(id)
            .bind(actor)
            .bind(notes)
            .fetch_optional(executor)
            .await
    }

    /// Moves an approved request bound to `agency_id` to cancelled
    ///
    /// Returns `None` if the request is missing, not approved, or bound to
    /// another agency.
    pub async fn cancel<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        agency_id: Uuid,
        actor: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agency_requests
            SET status = 'cancelled', cancelled_by = $3, cancelled_at = NOW()
            WHERE id = $1 AND status = 'approved' AND agency_id = $2
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(id)
            .bind(agency_id)
            .bind(actor)
            .fetch_optional(executor)
            .await
    }

    /// Redeems the approval code and binds the request to `agency_id`
    ///
    /// This is the compare-and-swap that makes codes single-use: it only
    /// matches while `status = 'approved' AND code_used = FALSE`, so of two
    /// concurrent redemptions exactly one gets a row back.
    pub async fn mark_code_used<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agency_requests
            SET code_used = TRUE, agency_id = $2, code_used_at = NOW()
            WHERE id = $1 AND status = 'approved' AND code_used = FALSE
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, AccessRequest>(&sql)
            .bind(id)
            .bind(agency_id)
            .fetch_optional(executor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request() -> NewAccessRequest {
        NewAccessRequest {
            agency_name: "  Acme Travel ".to_string(),
            contact_email: " A@Acme.com ".to_string(),
            phone_number: Some("   ".to_string()),
            group_type: Some("school".to_string()),
            message: None,
        }
    }

    #[test]
    fn test_request_status_round_trip_strings() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("used"), None);
    }

    #[test]
    fn test_normalized_trims_and_lowercases() {
        let data = new_request().normalized();
        assert_eq!(data.agency_name, "Acme Travel");
        assert_eq!(data.contact_email, "a@acme.com");
        assert_eq!(data.phone_number, None);
        assert_eq!(data.group_type.as_deref(), Some("school"));
    }

    #[test]
    fn test_pending_request_has_no_code() {
        let request = AccessRequest::pending(new_request().normalized());
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.approval_code.is_none());
        assert!(!request.code_used);
        assert!(request.agency_id.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_email() {
        let mut data = new_request();
        data.contact_email = "not-an-email".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let request = AccessRequest::pending(new_request().normalized());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["agencyName"], "Acme Travel");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["codeUsed"], false);
        assert!(json["approvalCode"].is_null());
    }
}

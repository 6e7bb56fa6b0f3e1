/// Agency model and database operations
///
/// An agency is the tenant root: every family, group, invoice, quotation and
/// document belongs to exactly one agency. Agencies are only created by the
/// signup flow, which links each one back to the access request it came from.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE agencies (
///     id UUID PRIMARY KEY,
///     name VARCHAR(200) NOT NULL,
///     plan VARCHAR(50) NOT NULL DEFAULT 'trial',
///     billing_status VARCHAR(50) NOT NULL DEFAULT 'trialing',
///     trial_ends_at TIMESTAMPTZ,
///     beta_access BOOLEAN NOT NULL DEFAULT FALSE,
///     branding JSONB NOT NULL DEFAULT '{}',
///     owner_id UUID NOT NULL,
///     request_id UUID NOT NULL UNIQUE REFERENCES agency_requests(id),
///     ...
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;
use validator::{Validate, ValidationError};

const COLUMNS: &str = "id, name, contact_email, billing_email, phone_number, plan, billing_status, \
    trial_ends_at, beta_access, beta_granted_at, branding, active_groups_count, families_count, \
    storage_used_bytes, owner_id, request_id, created_at, updated_at";

/// Length of the free trial granted at signup
pub const TRIAL_DAYS: i64 = 14;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgencyPlan {
    Trial,
    Basic,
    Pro,
    Enterprise,
}

impl AgencyPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyPlan::Trial => "trial",
            AgencyPlan::Basic => "basic",
            AgencyPlan::Pro => "pro",
            AgencyPlan::Enterprise => "enterprise",
        }
    }
}

impl TryFrom<String> for AgencyPlan {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "trial" => Ok(AgencyPlan::Trial),
            "basic" => Ok(AgencyPlan::Basic),
            "pro" => Ok(AgencyPlan::Pro),
            "enterprise" => Ok(AgencyPlan::Enterprise),
            other => Err(format!("unknown agency plan '{}'", other)),
        }
    }
}

/// Billing state of the agency's subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Trialing => "trialing",
            BillingStatus::Active => "active",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for BillingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "trialing" => Ok(BillingStatus::Trialing),
            "active" => Ok(BillingStatus::Active),
            "past_due" => Ok(BillingStatus::PastDue),
            "cancelled" => Ok(BillingStatus::Cancelled),
            other => Err(format!("unknown billing status '{}'", other)),
        }
    }
}

/// Portal branding shown to the agency's travelers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    /// Hex color such as `#1a73e8`
    #[validate(custom(function = "validate_hex_color"))]
    pub primary_color: Option<String>,

    #[validate(url(message = "Logo must be a valid URL"))]
    pub logo_url: Option<String>,

    #[validate(length(max = 100, message = "Portal name must be at most 100 characters"))]
    pub portal_name: Option<String>,
}

/// Accepts `#rgb`, `#rrggbb` and `#rrggbbaa`
fn validate_hex_color(value: &str) -> Result<(), ValidationError> {
    let digits = value.strip_prefix('#').unwrap_or("");
    let valid = matches!(digits.len(), 3 | 6 | 8) && digits.chars().all(|c| c.is_ascii_hexdigit());

    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("hex_color");
        err.message = Some("Color must be a hex value like #1a73e8".into());
        Err(err)
    }
}

/// Agency (tenant root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: Uuid,

    pub name: String,

    pub contact_email: String,

    pub billing_email: String,

    pub phone_number: Option<String>,

    #[sqlx(try_from = "String")]
    pub plan: AgencyPlan,

    #[sqlx(try_from = "String")]
    pub billing_status: BillingStatus,

    /// End of the free trial (signup + 14 days)
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// Provisional beta entitlement, revocable via access cancellation
    pub beta_access: bool,

    pub beta_granted_at: Option<DateTime<Utc>>,

    #[sqlx(json)]
    pub branding: Branding,

    pub active_groups_count: i32,
    pub families_count: i32,
    pub storage_used_bytes: i64,

    /// Identity that created the agency at signup
    pub owner_id: Uuid,

    /// Access request this agency was created from
    pub request_id: Uuid,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agency {
    /// Whether the agency is still inside its trial window at `now`
    pub fn in_trial(&self, now: DateTime<Utc>) -> bool {
        self.plan == AgencyPlan::Trial && self.trial_ends_at.map_or(false, |end| now < end)
    }
}

/// Input for creating an agency during signup
#[derive(Debug, Clone)]
pub struct NewAgency {
    pub id: Uuid,
    pub name: String,
    pub contact_email: String,
    pub phone_number: Option<String>,
    pub owner_id: Uuid,
    pub request_id: Uuid,
    pub trial_ends_at: DateTime<Utc>,
}

impl NewAgency {
    /// Seeds a trial agency from the originating request's fields
    pub fn for_signup(
        request: &super::access_request::AccessRequest,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.agency_name.clone(),
            contact_email: request.contact_email.clone(),
            phone_number: request.phone_number.clone(),
            owner_id,
            request_id: request.id,
            trial_ends_at: now + Duration::days(TRIAL_DAYS),
        }
    }

    /// Materializes the row as the in-memory store keeps it
    pub fn into_agency(self, now: DateTime<Utc>) -> Agency {
        Agency {
            id: self.id,
            name: self.name,
            billing_email: self.contact_email.clone(),
            contact_email: self.contact_email,
            phone_number: self.phone_number,
            plan: AgencyPlan::Trial,
            billing_status: BillingStatus::Trialing,
            trial_ends_at: Some(self.trial_ends_at),
            beta_access: true,
            beta_granted_at: Some(now),
            branding: Branding::default(),
            active_groups_count: 0,
            families_count: 0,
            storage_used_bytes: 0,
            owner_id: self.owner_id,
            request_id: self.request_id,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Agency {
    /// Inserts a trial agency with beta access granted
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewAgency,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO agencies (id, name, contact_email, billing_email, phone_number, plan,
                                  billing_status, trial_ends_at, beta_access, beta_granted_at,
                                  owner_id, request_id)
            VALUES ($1, $2, $3, $3, $4, 'trial', 'trialing', $5, TRUE, NOW(), $6, $7)
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, Agency>(&sql)
            .bind(data.id)
            .bind(data.name)
            .bind(data.contact_email)
            .bind(data.phone_number)
            .bind(data.trial_ends_at)
            .bind(data.owner_id)
            .bind(data.request_id)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM agencies WHERE id = $1");

        sqlx::query_as::<_, Agency>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Clears the beta entitlement
    ///
    /// Returns `None` if the agency does not exist.
    pub async fn revoke_beta<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agencies
            SET beta_access = FALSE, beta_granted_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, Agency>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Replaces the agency's branding
    pub async fn update_branding<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        branding: &Branding,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE agencies
            SET branding = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, Agency>(&sql)
            .bind(id)
            .bind(sqlx::types::Json(branding))
            .fetch_optional(executor)
            .await
    }
}

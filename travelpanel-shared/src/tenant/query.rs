/// Tenant-scoped queries
///
/// A [`ScopedQuery`] cannot be built without an agency: the scope is a
/// constructor argument and there is no way to remove it afterwards. Caller
/// filters are restricted to simple field comparisons on the JSON payload.

use super::{AgencyId, TenantError, AGENCY_FIELD};
use crate::models::document::{Collection, TenantDocument};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Upper bound on rows returned by one query
pub const MAX_LIMIT: i64 = 500;

const DEFAULT_LIMIT: i64 = 100;
const MAX_FIELD_LEN: usize = 64;

/// Comparison operator for a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" | "==" => Some(FilterOp::Eq),
            "ne" | "!=" => Some(FilterOp::Ne),
            "gt" | ">" => Some(FilterOp::Gt),
            "gte" | ">=" => Some(FilterOp::Gte),
            "lt" | "<" => Some(FilterOp::Lt),
            "lte" | "<=" => Some(FilterOp::Lte),
            _ => None,
        }
    }

    /// SQL operator applied to `jsonb` operands
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
        }
    }
}

/// One `data.<field> <op> <value>` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl Filter {
    /// Evaluates the predicate against a payload
    ///
    /// Missing fields never match. Equality compares any JSON values; range
    /// operators only compare numbers, strings and booleans of the same type.
    pub fn matches(&self, data: &JsonValue) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Eq => json_eq(actual, &self.value),
            FilterOp::Ne => !json_eq(actual, &self.value),
            op => compare(actual, &self.value).map_or(false, |ord| op.accepts(ord)),
        }
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Query over one agency's documents in one collection
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    collection: Collection,
    agency_id: AgencyId,
    filters: Vec<Filter>,
    limit: i64,
    newest_first: bool,
}

impl ScopedQuery {
    pub fn new(collection: Collection, agency_id: AgencyId) -> Self {
        Self {
            collection,
            agency_id,
            filters: Vec::new(),
            limit: DEFAULT_LIMIT,
            newest_first: true,
        }
    }

    /// Adds a payload predicate
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `field` is empty, longer than 64 characters or
    ///   contains anything other than ASCII letters, digits and `_`
    /// - `TenantMismatch` for any `agencyId` predicate other than equality
    ///   with the query's own agency (which is accepted and dropped)
    pub fn filter(
        mut self,
        field: &str,
        op: FilterOp,
        value: impl Into<JsonValue>,
    ) -> Result<Self, TenantError> {
        validate_field(field)?;
        let value = value.into();

        if field == AGENCY_FIELD {
            let same_agency = op == FilterOp::Eq
                && value
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .map_or(false, |id: uuid::Uuid| id == self.agency_id.as_uuid());

            if !same_agency {
                return Err(TenantError::TenantMismatch);
            }
            return Ok(self);
        }

        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value,
        });
        Ok(self)
    }

    /// Caps the number of rows (clamped to `1..=MAX_LIMIT`)
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn limit_value(&self) -> i64 {
        self.limit
    }

    pub fn is_newest_first(&self) -> bool {
        self.newest_first
    }

    /// Whether a stored document satisfies the scope and every filter
    pub fn matches(&self, doc: &TenantDocument) -> bool {
        doc.collection == self.collection
            && doc.agency_id == self.agency_id.as_uuid()
            && self.filters.iter().all(|f| f.matches(&doc.data))
    }
}

fn validate_field(field: &str) -> Result<(), TenantError> {
    let valid = !field.is_empty()
        && field.len() <= MAX_FIELD_LEN
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(TenantError::InvalidArgument(format!(
            "invalid filter field '{}'",
            field
        )))
    }
}

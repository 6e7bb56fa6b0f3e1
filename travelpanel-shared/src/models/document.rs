/// Tenant-owned documents
///
/// Families, groups, payments, invoices, quotations and uploaded documents
/// share one table. Each row carries its owning agency twice: in the
/// `agency_id` column used for scoping, and as `agencyId` inside the JSON
/// payload that clients read. A check constraint keeps the two in step.
///
/// Reads and writes should go through [`crate::tenant`], which applies the
/// agency scope; the functions here assume the caller already has.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenant_documents (
///     id UUID PRIMARY KEY,
///     collection VARCHAR(32) NOT NULL,
///     agency_id UUID NOT NULL REFERENCES agencies(id) ON DELETE CASCADE,
///     data JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT tenant_documents_agency_stamp CHECK (data ->> 'agencyId' = agency_id::text)
/// );
/// ```

use crate::tenant::query::{FilterOp, ScopedQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{PgExecutor, Postgres, QueryBuilder};
use std::fmt;
use uuid::Uuid;

const COLUMNS: &str = "id, collection, agency_id, data, created_at, updated_at";

/// Agency-owned collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Families,
    Groups,
    Payments,
    Invoices,
    Quotations,
    Documents,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Families,
        Collection::Groups,
        Collection::Payments,
        Collection::Invoices,
        Collection::Quotations,
        Collection::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Families => "families",
            Collection::Groups => "groups",
            Collection::Payments => "payments",
            Collection::Invoices => "invoices",
            Collection::Quotations => "quotations",
            Collection::Documents => "documents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Collection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Collection::parse(&value).ok_or_else(|| format!("unknown collection '{}'", value))
    }
}

/// A JSON document owned by one agency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantDocument {
    pub id: Uuid,

    #[sqlx(try_from = "String")]
    pub collection: Collection,

    pub agency_id: Uuid,

    /// Client payload; always contains a matching `agencyId`
    #[sqlx(json)]
    pub data: JsonValue,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a document (payload must already be stamped)
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub collection: Collection,
    pub agency_id: Uuid,
    pub data: JsonValue,
}

impl NewDocument {
    pub fn into_document(self, now: DateTime<Utc>) -> TenantDocument {
        TenantDocument {
            id: Uuid::new_v4(),
            collection: self.collection,
            agency_id: self.agency_id,
            data: self.data,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TenantDocument {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewDocument,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO tenant_documents (id, collection, agency_id, data)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, TenantDocument>(&sql)
            .bind(Uuid::new_v4())
            .bind(data.collection.as_str())
            .bind(data.agency_id)
            .bind(Json(data.data))
            .fetch_one(executor)
            .await
    }

    /// Fetches a document without any agency filter
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM tenant_documents WHERE id = $1 AND collection = $2");

        sqlx::query_as::<_, TenantDocument>(&sql)
            .bind(id)
            .bind(collection.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Runs a scoped query
    ///
    /// The agency and collection predicates come from the query's
    /// constructor and are always present. Field names and values are bound
    /// as parameters. Range operators only match values of the same JSON
    /// type as the operand.
    pub async fn query<'e, E: PgExecutor<'e>>(
        executor: E,
        query: &ScopedQuery,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM tenant_documents WHERE agency_id = "));
        builder.push_bind(query.agency_id().as_uuid());
        builder.push(" AND collection = ");
        builder.push_bind(query.collection().as_str());

        for filter in query.filters() {
            let op = filter.op.sql();
            match filter.op {
                FilterOp::Eq | FilterOp::Ne => {
                    builder.push(" AND data -> ");
                    builder.push_bind(filter.field.clone());
                    builder.push(format!(" {op} "));
                    builder.push_bind(Json(filter.value.clone()));
                }
                FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                    builder.push(" AND jsonb_typeof(data -> ");
                    builder.push_bind(filter.field.clone());
                    builder.push(") = jsonb_typeof(");
                    builder.push_bind(Json(filter.value.clone()));
                    builder.push(") AND data -> ");
                    builder.push_bind(filter.field.clone());
                    builder.push(format!(" {op} "));
                    builder.push_bind(Json(filter.value.clone()));
                }
            }
        }

        if query.is_newest_first() {
            builder.push(" ORDER BY created_at DESC");
        } else {
            builder.push(" ORDER BY created_at ASC");
        }
        builder.push(" LIMIT ");
        builder.push_bind(query.limit_value());

        builder.build_query_as::<TenantDocument>().fetch_all(executor).await
    }

    /// Replaces a document's payload if it belongs to `agency_id`
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
        data: JsonValue,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE tenant_documents
            SET data = $4, updated_at = NOW()
            WHERE id = $1 AND collection = $2 AND agency_id = $3
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, TenantDocument>(&sql)
            .bind(id)
            .bind(collection.as_str())
            .bind(agency_id)
            .bind(Json(data))
            .fetch_optional(executor)
            .await
    }

    /// Deletes a document if it belongs to `agency_id`
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        collection: Collection,
        id: Uuid,
        agency_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM tenant_documents WHERE id = $1 AND collection = $2 AND agency_id = $3",
        )
        .bind(id)
        .bind(collection.as_str())
        .bind(agency_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Login identities
///
/// An identity is an email + password credential. It exists independently of
/// any agency so that signup can create it before the agency and user rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE identities (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Email + password credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,

    /// Lowercased email address
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Inserts a new identity
    ///
    /// # Errors
    ///
    /// Returns a unique-violation error if the email is already registered
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
        password_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO identities (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_email<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Identity>(
            "SELECT id, email, password_hash, created_at FROM identities WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Deletes an identity, returning whether a row was removed
    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_is_never_serialized() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "owner@acme.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("owner@acme.com"));
    }
}

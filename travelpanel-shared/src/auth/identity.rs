/// Identity provider seam
///
/// Signup creates the login identity before the agency exists, and deletes
/// it again if the agency write fails. [`PasswordIdentityProvider`] is the
/// built-in provider (Argon2id hashes in the `identities` table); an external
/// provider can be plugged in behind the same trait.

use super::password::{hash_password, verify_password, PasswordError};
use crate::models::identity::Identity;
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("An account with this email already exists")]
    Conflict,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Storage(StoreError),

    #[error("Password hashing task failed: {0}")]
    Task(String),
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            IdentityError::Conflict
        } else {
            IdentityError::Storage(err)
        }
    }
}

/// Creates, checks and removes login identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers a new identity; `Conflict` if the email is taken
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Returns the identity for matching credentials
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Removes an identity (signup compensation); missing is not an error
    async fn delete_identity(&self, id: Uuid) -> Result<(), IdentityError>;
}

/// Password identities stored through the [`Store`]
#[derive(Clone)]
pub struct PasswordIdentityProvider {
    store: Arc<dyn Store>,
}

impl PasswordIdentityProvider {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityProvider for PasswordIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let email = email.trim().to_lowercase();
        let password = password.to_string();

        // Argon2 is CPU-bound; keep it off the async workers
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| IdentityError::Task(e.to_string()))??;

        Ok(self.store.create_identity(&email, &hash).await?)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let email = email.trim().to_lowercase();
        let Some(identity) = self.store.find_identity_by_email(&email).await? else {
            debug!("Login for unknown email");
            return Err(IdentityError::InvalidCredentials);
        };

        let password = password.to_string();
        let hash = identity.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| IdentityError::Task(e.to_string()))??;

        if valid {
            Ok(identity)
        } else {
            Err(IdentityError::InvalidCredentials)
        }
    }

    async fn delete_identity(&self, id: Uuid) -> Result<(), IdentityError> {
        self.store.delete_identity(id).await?;
        Ok(())
    }
}

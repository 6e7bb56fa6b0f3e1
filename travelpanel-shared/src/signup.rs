/// Signup orchestration
///
/// Turns an approved access request into an agency with its first admin
/// user:
///
/// 1. re-validate the approval code against the email
/// 2. check the password rules
/// 3. create the login identity
/// 4. in one storage transaction, redeem the code and insert the agency and
///    the admin user
///
/// If step 4 fails the identity from step 3 is deleted again. The code is
/// redeemed with a conditional write inside that transaction, so concurrent
/// signups with one code produce exactly one agency; the losers see
/// `CODE_USED`.

use crate::access::{AccessService, CodeErrorKind, CodeValidation, RequestEventKind};
use crate::auth::identity::{IdentityError, IdentityProvider};
use crate::auth::password::{validate_password_strength, PasswordError};
use crate::models::access_request::AccessRequest;
use crate::models::agency::{Agency, NewAgency};
use crate::models::identity::Identity;
use crate::models::user::{NewUser, User, UserRole};
use crate::store::{SignupRecord, StoreError};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Credentials chosen by the new agency admin
#[derive(Debug, Clone, Deserialize)]
pub struct SignupCredentials {
    pub password: String,

    /// Display name of the admin user
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum SignupError {
    /// The code did not validate (or lost the redemption race)
    #[error("{}", .0.message())]
    Rejected(CodeErrorKind),

    #[error(transparent)]
    WeakPassword(PasswordError),

    #[error("An account with this email already exists")]
    IdentityConflict,

    #[error(transparent)]
    Identity(IdentityError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<IdentityError> for SignupError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Conflict => SignupError::IdentityConflict,
            IdentityError::Storage(e) => SignupError::Storage(e),
            other => SignupError::Identity(other),
        }
    }
}

/// Rows created by a successful signup
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub request: AccessRequest,
    pub agency: Agency,
    pub user: User,
}

#[derive(Clone)]
pub struct SignupService {
    access: AccessService,
    identities: Arc<dyn IdentityProvider>,
}

impl SignupService {
    pub fn new(access: AccessService, identities: Arc<dyn IdentityProvider>) -> Self {
        Self { access, identities }
    }

    /// Creates an agency and its admin user from an approval code
    ///
    /// # Errors
    ///
    /// - `Rejected(kind)` if the code does not validate for `email`, or
    ///   `Rejected(CODE_USED)` if a concurrent signup redeemed it first
    /// - `WeakPassword` if the password breaks the rules
    /// - `IdentityConflict` if the email already belongs to an account
    /// - `Identity` / `Storage` for provider or storage failures
    pub async fn complete_signup(
        &self,
        code: &str,
        email: &str,
        credentials: SignupCredentials,
    ) -> Result<SignupOutcome, SignupError> {
        let request = match self.access.validate_approval_code(code, email).await {
            CodeValidation::Valid(request) => request,
            CodeValidation::Invalid(rejection) => {
                return Err(SignupError::Rejected(rejection.error));
            }
        };

        validate_password_strength(&credentials.password).map_err(SignupError::WeakPassword)?;

        let (identity, created) = self
            .obtain_identity(&request.contact_email, &credentials.password)
            .await?;

        let now = Utc::now();
        let agency = NewAgency::for_signup(&request, identity.id, now);
        let user = NewUser {
            id: identity.id,
            email: identity.email.clone(),
            name: credentials
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            role: UserRole::Admin,
            agency_id: agency.id,
        };
        let record = SignupRecord {
            request_id: request.id,
            agency,
            user,
        };

        match self.access.store().complete_signup(record).await {
            Ok(rows) => {
                info!(
                    request_id = %rows.request.id,
                    agency_id = %rows.agency.id,
                    user_id = %rows.user.id,
                    "Signup completed"
                );
                self.access.notify(RequestEventKind::CodeUsed, &rows.request);
                Ok(SignupOutcome {
                    request: rows.request,
                    agency: rows.agency,
                    user: rows.user,
                })
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Signup write failed");
                if created {
                    self.compensate(&identity).await;
                }
                Err(match e {
                    StoreError::CasFailed => SignupError::Rejected(CodeErrorKind::CodeUsed),
                    StoreError::Conflict(_) => SignupError::IdentityConflict,
                    other => SignupError::Storage(other),
                })
            }
        }
    }

    /// Creates the identity, or adopts one left behind by an earlier
    /// attempt that never got its user row
    ///
    /// Returns the identity and whether this call created it.
    async fn obtain_identity(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, bool), SignupError> {
        match self.identities.create_identity(email, password).await {
            Ok(identity) => Ok((identity, true)),
            Err(IdentityError::Conflict) => {
                let identity = match self.identities.authenticate(email, password).await {
                    Ok(identity) => identity,
                    Err(IdentityError::InvalidCredentials) => {
                        return Err(SignupError::IdentityConflict)
                    }
                    Err(e) => return Err(e.into()),
                };

                if self.access.store().find_user(identity.id).await?.is_some() {
                    return Err(SignupError::IdentityConflict);
                }

                info!(identity_id = %identity.id, "Adopting identity without a user");
                Ok((identity, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes an identity whose signup write failed
    ///
    /// Skipped if a user now exists for it (another attempt adopted it and
    /// won).
    async fn compensate(&self, identity: &Identity) {
        match self.access.store().find_user(identity.id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                error!(identity_id = %identity.id, error = %e, "Could not check identity before compensation");
                return;
            }
        }

        if let Err(e) = self.identities.delete_identity(identity.id).await {
            error!(
                identity_id = %identity.id,
                error = %e,
                "Failed to delete identity after signup failure"
            );
        }
    }
}

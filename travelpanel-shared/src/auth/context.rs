use super::jwt::Claims;
use crate::models::user::UserRole;
use crate::tenant::AgencyId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated agency user, derived from a validated access token
///
/// The API's auth middleware inserts this into request extensions; tenant
/// handlers take the agency from here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: Uuid,
    pub agency_id: AgencyId,
    pub role: UserRole,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            agency_id: AgencyId::from(claims.agency_id),
            role: claims.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

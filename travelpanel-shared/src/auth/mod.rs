/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and password rules
/// - [`jwt`]: access/refresh tokens for agency users
/// - [`admin`]: the platform admin key
/// - [`context`]: the authenticated caller as seen by handlers
/// - [`identity`]: the identity provider seam used by signup and login
///
/// # Example
///
/// ```no_run
/// use travelpanel_shared::auth::password::{hash_password, verify_password};
/// use travelpanel_shared::auth::jwt::{issue_token_pair, validate_access_token};
/// use travelpanel_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Sunr1se!Tours")?;
/// assert!(verify_password("Sunr1se!Tours", &hash)?);
///
/// let secret = "an-hs256-secret-of-at-least-32-bytes";
/// let pair = issue_token_pair(Uuid::new_v4(), Uuid::new_v4(), UserRole::Admin, secret)?;
/// validate_access_token(&pair.access_token, secret)?;
/// # Ok(())
/// # }
/// ```

pub mod admin;
pub mod context;
pub mod identity;
pub mod jwt;
pub mod password;

pub use context::AuthContext;
pub use identity::{IdentityError, IdentityProvider, PasswordIdentityProvider};

/// Database models for TravelPanel
///
/// Each model owns its row type and the SQL that reads and writes it. The
/// functions are generic over `PgExecutor` so they run equally against the
/// pool or inside a transaction; [`crate::store::PgStore`] composes them.
///
/// # Models
///
/// - `access_request`: Applications for platform access and their approval codes
/// - `agency`: Tenant roots created at signup
/// - `user`: Agency staff accounts
/// - `identity`: Email + password credentials
/// - `document`: Agency-owned JSON documents (families, groups, ...)
///
/// # Example
///
/// ```no_run
/// use travelpanel_shared::models::access_request::{AccessRequest, RequestStatus};
/// use travelpanel_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let pending = AccessRequest::list(&pool, Some(RequestStatus::Pending), 50, 0).await?;
/// println!("{} requests waiting", pending.len());
/// # Ok(())
/// # }
/// ```

pub mod access_request;
pub mod agency;
pub mod document;
pub mod identity;
pub mod user;

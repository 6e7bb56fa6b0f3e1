/// Postgres plumbing
///
/// - `pool`: connection pool construction and health checks
/// - `migrations`: embedded schema migrations and their status
///
/// Query code lives with the models; [`crate::store::PgStore`] is the
/// entry point the services use.

pub mod migrations;
pub mod pool;

/// Middleware modules for the API server
///
/// - `security`: Security headers on every response
/// - `rate_limit`: Per-client token bucket for the code and login endpoints

pub mod rate_limit;
pub mod security;

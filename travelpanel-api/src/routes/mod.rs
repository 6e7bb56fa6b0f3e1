/// API route handlers
///
/// - `health`: Health check endpoint
/// - `access_requests`: Public request submission and code validation
/// - `signup`: Approval-code redemption
/// - `auth`: Login and token refresh
/// - `admin`: Platform admin review of access requests
/// - `agency`: The caller's agency and its branding
/// - `collections`: Tenant-scoped documents

pub mod access_requests;
pub mod admin;
pub mod agency;
pub mod auth;
pub mod collections;
pub mod health;
pub mod signup;

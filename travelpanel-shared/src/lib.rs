//! # TravelPanel Shared Library
//!
//! Domain types, storage and business rules shared by the TravelPanel API
//! server.
//!
//! ## Module Organization
//!
//! - `access`: Access-request lifecycle and approval codes
//! - `signup`: Converting an approved request into an agency and admin user
//! - `tenant`: Tenant-scoping guard for agency-owned documents
//! - `store`: Storage seam with Postgres and in-memory backends
//! - `models`: Database models and their queries
//! - `auth`: Password hashing, JWT and platform admin credentials
//! - `db`: Connection pool and migrations

pub mod access;
pub mod auth;
pub mod db;
pub mod models;
pub mod signup;
pub mod store;
pub mod tenant;

/// Current version of the TravelPanel shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

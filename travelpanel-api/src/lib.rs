//! # TravelPanel API Server Library
//!
//! HTTP surface for the TravelPanel back-office: public access requests and
//! signup, platform admin review, and agency-scoped data.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder and auth middleware
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Rate limiting and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

//! HTTP authorization service.
//!
//! Thin axum surface over [`guarita_authz::engine::AuthzEngine`]: one check
//! endpoint, policy and role administration, reload and stats. Backend
//! selection (in-memory or PostgreSQL) happens at startup from
//! [`config::ServerConfig`].

pub mod config;
pub mod routes;

pub use config::{ServerConfig, StorageBackend};
pub use routes::{AppState, router};

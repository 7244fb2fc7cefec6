//! PostgreSQL storage backend for guarita-authz.
//!
//! Provides persistent implementations of the engine's three I/O boundaries:
//!
//! - [`PgPolicyStore`] - policy rows in the `policy_rule` table
//! - [`PgUserDirectory`] - identity alias lookups against `app_user`
//! - [`PgAuditSink`] - decision records appended to `access_log`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use guarita_authz::config::AuthzConfig;
//! use guarita_authz::engine::AuthzEngine;
//! use guarita_authz_postgres::{connect, PgAuditSink, PgPolicyStore, PgUserDirectory};
//!
//! let pool = connect("postgres://localhost/guarita").await?;
//! let config = AuthzConfig::default();
//! let engine = AuthzEngine::new(Arc::new(PgPolicyStore::new(pool.clone())), &config)
//!     .with_directory(Arc::new(PgUserDirectory::new(pool.clone())), &config)
//!     .with_audit_sink(Arc::new(PgAuditSink::new(pool)), &config);
//! ```

pub mod audit;
pub mod directory;
pub mod policy;

use guarita_authz::AuthzError;
use sqlx_core::pool::Pool;
use sqlx_postgres::{PgPoolOptions, Postgres};

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use audit::PgAuditSink;
pub use directory::PgUserDirectory;
pub use policy::PgPolicyStore;

/// Connect to PostgreSQL with sensible pool defaults.
///
/// # Errors
///
/// Returns `StoreUnavailable` when the database cannot be reached.
pub async fn connect(database_url: &str) -> Result<PgPool, AuthzError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| AuthzError::store_unavailable(format!("failed to connect: {e}")))
}

/// Map a database error onto the engine's error taxonomy.
pub(crate) fn db_error(e: sqlx_core::Error) -> AuthzError {
    AuthzError::store_unavailable(e.to_string())
}

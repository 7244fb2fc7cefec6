//! User directory lookups.
//!
//! Resolves identity aliases against the `app_user` table:
//!
//! ```sql
//! CREATE TABLE app_user (
//!     id    TEXT PRIMARY KEY,
//!     email TEXT UNIQUE NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx_core::query_as::query_as;

use guarita_authz::AuthzError;
use guarita_authz::AuthzResult;
use guarita_authz::identity::UserDirectory;

use crate::PgPool;

/// Directory over the `app_user` table.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lookup_error(e: sqlx_core::Error) -> AuthzError {
    AuthzError::directory_lookup_failed(e.to_string())
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn id_for_email(&self, email: &str) -> AuthzResult<Option<String>> {
        let row: Option<(String,)> = query_as("SELECT id FROM app_user WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(lookup_error)?;
        Ok(row.map(|(id,)| id))
    }

    async fn email_for_id(&self, id: &str) -> AuthzResult<Option<String>> {
        let row: Option<(String,)> = query_as("SELECT email FROM app_user WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(lookup_error)?;
        Ok(row.map(|(email,)| email))
    }
}

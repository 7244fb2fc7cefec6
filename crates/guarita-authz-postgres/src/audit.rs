//! Persistent audit sink.
//!
//! Appends one row per decision to the `access_log` table:
//!
//! ```sql
//! CREATE TABLE access_log (
//!     id         BIGSERIAL PRIMARY KEY,
//!     subject    TEXT NOT NULL,
//!     object     TEXT NOT NULL,
//!     action     TEXT NOT NULL,
//!     allowed    BOOLEAN NOT NULL,
//!     reason     TEXT NOT NULL,
//!     ip         TEXT,
//!     user_agent TEXT,
//!     user_id    TEXT,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx_core::query::query;

use guarita_authz::AuthzError;
use guarita_authz::AuthzResult;
use guarita_authz::audit::{AuditRecord, AuditSink};

use crate::PgPool;

/// Audit sink over the `access_log` table.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Create a sink over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write(&self, record: &AuditRecord) -> AuthzResult<()> {
        query(
            r#"
            INSERT INTO access_log
                (subject, object, action, allowed, reason, ip, user_agent, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.subject)
        .bind(&record.object)
        .bind(&record.action)
        .bind(record.allowed)
        .bind(&record.reason)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .bind(&record.user_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthzError::audit_sink_failed(e.to_string()))?;
        Ok(())
    }
}

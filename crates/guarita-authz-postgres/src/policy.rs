//! Policy rule storage.
//!
//! Rules live in the `policy_rule` table as positional rows:
//!
//! ```sql
//! CREATE TABLE policy_rule (
//!     id   BIGSERIAL PRIMARY KEY,
//!     kind TEXT NOT NULL,
//!     v0   TEXT,
//!     v1   TEXT,
//!     v2   TEXT,
//!     v3   TEXT,
//!     v4   TEXT,
//!     v5   TEXT
//! );
//! ```

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use guarita_authz::policy::{Effect, PolicyRow, PolicyRule, RuleKind};
use guarita_authz::storage::PolicyStore;
use guarita_authz::AuthzResult;

use crate::{PgPool, db_error};

type DbRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn to_policy_row(row: &DbRow) -> PolicyRow {
    PolicyRow {
        kind: row.1.clone(),
        v0: row.2.clone(),
        v1: row.3.clone(),
        v2: row.4.clone(),
        v3: row.5.clone(),
        v4: row.6.clone(),
        v5: row.7.clone(),
    }
}

/// Policy store over the `policy_rule` table.
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    /// Load every persisted rule.
    ///
    /// A row that fails sanitation or predicate validation is logged with its
    /// id and skipped; one bad row must not take the whole ruleset down.
    async fn load_all(&self) -> AuthzResult<Vec<PolicyRule>> {
        let rows: Vec<DbRow> = query_as(
            r#"
            SELECT id, kind, v0, v1, v2, v3, v4, v5
            FROM policy_rule
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            match to_policy_row(row).to_rule() {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    tracing::warn!(id = row.0, error = %e, "skipping malformed policy row");
                }
            }
        }
        Ok(rules)
    }

    async fn insert(&self, rule: &PolicyRule) -> AuthzResult<bool> {
        let rule = rule.clone().sanitized();
        rule.validate()?;
        let row = PolicyRow::from_rule(&rule);

        let existing: Option<(i64,)> = query_as(
            r#"
            SELECT id FROM policy_rule
            WHERE kind = $1
              AND v0 IS NOT DISTINCT FROM $2
              AND v1 IS NOT DISTINCT FROM $3
              AND v2 IS NOT DISTINCT FROM $4
              AND v3 IS NOT DISTINCT FROM $5
              AND v4 IS NOT DISTINCT FROM $6
            "#,
        )
        .bind(&row.kind)
        .bind(&row.v0)
        .bind(&row.v1)
        .bind(&row.v2)
        .bind(&row.v3)
        .bind(&row.v4)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if existing.is_some() {
            return Ok(false);
        }

        query(
            r#"
            INSERT INTO policy_rule (kind, v0, v1, v2, v3, v4, v5)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&row.kind)
        .bind(&row.v0)
        .bind(&row.v1)
        .bind(&row.v2)
        .bind(&row.v3)
        .bind(&row.v4)
        .bind(&row.v5)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(true)
    }

    async fn remove(
        &self,
        subject: &str,
        object: &str,
        action: &str,
        effect: Effect,
    ) -> AuthzResult<bool> {
        let result = query(
            r#"
            DELETE FROM policy_rule
            WHERE kind = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4 AND v3 = $5
            "#,
        )
        .bind(RuleKind::Grant.as_str())
        .bind(subject)
        .bind(object)
        .bind(action)
        .bind(effect.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_grouping(&self, principal: &str, role: &str) -> AuthzResult<bool> {
        let result = query(
            r#"
            DELETE FROM policy_rule
            WHERE kind = $1 AND v0 = $2 AND v1 = $3
            "#,
        )
        .bind(RuleKind::Grouping.as_str())
        .bind(principal)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

//! Storage traits for authorization data.
//!
//! This module defines the I/O boundaries of the engine:
//!
//! - [`PolicyStore`] - bulk load and mutation of policy rows
//!
//! The in-memory implementation lives in [`memory`]; the PostgreSQL backend
//! is provided by the `guarita-authz-postgres` crate.

pub mod memory;

use async_trait::async_trait;

use crate::AuthzResult;
use crate::policy::rule::{Effect, PolicyRule};

/// Persistence boundary for policy rules.
///
/// Implementations must sanitize string fields and validate context
/// predicates before a row is written; a malformed rule is rejected with
/// `InvalidPolicy` and nothing is persisted. Connection-level failures map to
/// `StoreUnavailable`.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load every persisted rule.
    ///
    /// Rows that fail sanitation or predicate validation are skipped and
    /// logged individually; they never enter the active ruleset.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backing store cannot be reached.
    async fn load_all(&self) -> AuthzResult<Vec<PolicyRule>>;

    /// Persist a rule.
    ///
    /// Returns `false` without writing when an equivalent rule already
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for a malformed rule, `StoreUnavailable` for
    /// store failures.
    async fn insert(&self, rule: &PolicyRule) -> AuthzResult<bool>;

    /// Remove the grant rule matching the given tuple.
    ///
    /// Returns whether a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backing store cannot be reached.
    async fn remove(
        &self,
        subject: &str,
        object: &str,
        action: &str,
        effect: Effect,
    ) -> AuthzResult<bool>;

    /// Remove the grouping rule for the given principal/role pair.
    ///
    /// Returns whether a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backing store cannot be reached.
    async fn remove_grouping(&self, principal: &str, role: &str) -> AuthzResult<bool>;
}

pub use memory::MemoryPolicyStore;

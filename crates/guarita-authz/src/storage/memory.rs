//! In-memory policy store.
//!
//! Used by tests and single-process deployments that seed their rules at
//! startup. Shares the [`PolicyStore`] contract with the PostgreSQL backend,
//! including sanitation and predicate validation on insert.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::AuthzResult;
use crate::policy::rule::{Effect, PolicyRule, RuleKind};
use crate::storage::PolicyStore;

/// Thread-safe in-memory rule store.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    rules: RwLock<Vec<PolicyRule>>,
}

impl MemoryPolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with rules. Seeds are sanitized the same
    /// way inserted rules are.
    #[must_use]
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().map(PolicyRule::sanitized).collect()),
        }
    }

    /// Number of stored rules.
    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Whether the store holds no rules.
    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn load_all(&self) -> AuthzResult<Vec<PolicyRule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn insert(&self, rule: &PolicyRule) -> AuthzResult<bool> {
        let rule = rule.clone().sanitized();
        rule.validate()?;

        let mut rules = self.rules.write().await;
        if rules.iter().any(|existing| existing.is_equivalent(&rule)) {
            return Ok(false);
        }
        rules.push(rule);
        Ok(true)
    }

    async fn remove(
        &self,
        subject: &str,
        object: &str,
        action: &str,
        effect: Effect,
    ) -> AuthzResult<bool> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| {
            !(rule.kind == RuleKind::Grant
                && rule.subject == subject
                && rule.object == object
                && rule.action == action
                && rule.effect == effect)
        });
        Ok(rules.len() < before)
    }

    async fn remove_grouping(&self, principal: &str, role: &str) -> AuthzResult<bool> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|rule| {
            !(rule.kind == RuleKind::Grouping
                && rule.subject == principal
                && rule.object == role)
        });
        Ok(rules.len() < before)
    }
}

//! Immutable ruleset snapshots.
//!
//! A [`RuleSet`] is the full set of policy rows loaded from the store at one
//! instant. It is constructed once per load, shared as `Arc<RuleSet>`, and
//! replaced wholesale on reload; evaluations in flight keep reading the
//! snapshot they started with.

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::policy::rule::{PolicyRule, RuleKind};

/// Versioned, immutable snapshot of all active policy rules.
#[derive(Debug)]
pub struct RuleSet {
    grants: Vec<PolicyRule>,
    groupings: Vec<PolicyRule>,
    /// One-hop subject -> roles expansion. Roles are not nested: a role is
    /// never itself grouped into another role.
    roles_by_subject: HashMap<String, Vec<String>>,
    version: u64,
    loaded_at: OffsetDateTime,
}

impl RuleSet {
    /// Build a snapshot from loaded rules.
    #[must_use]
    pub fn build(rules: Vec<PolicyRule>, version: u64) -> Self {
        let mut grants = Vec::new();
        let mut groupings = Vec::new();
        let mut roles_by_subject: HashMap<String, Vec<String>> = HashMap::new();

        for rule in rules {
            match rule.kind {
                RuleKind::Grant => grants.push(rule),
                RuleKind::Grouping => {
                    let roles = roles_by_subject.entry(rule.subject.clone()).or_default();
                    if !roles.contains(&rule.object) {
                        roles.push(rule.object.clone());
                    }
                    groupings.push(rule);
                }
            }
        }

        Self {
            grants,
            groupings,
            roles_by_subject,
            version,
            loaded_at: OffsetDateTime::now_utc(),
        }
    }

    /// An empty snapshot (used before the first successful load).
    #[must_use]
    pub fn empty() -> Self {
        Self::build(Vec::new(), 0)
    }

    /// All grant rules, in load order.
    #[must_use]
    pub fn grants(&self) -> &[PolicyRule] {
        &self.grants
    }

    /// All grouping rules, in load order.
    #[must_use]
    pub fn groupings(&self) -> &[PolicyRule] {
        &self.groupings
    }

    /// Roles the subject is directly grouped into (one hop).
    #[must_use]
    pub fn roles_for(&self, subject: &str) -> &[String] {
        self.roles_by_subject
            .get(subject)
            .map_or(&[], Vec::as_slice)
    }

    /// Snapshot version, incremented by the cache on each reload.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When this snapshot was constructed.
    #[must_use]
    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    /// Total number of rules in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len() + self.groupings.len()
    }

    /// Whether the snapshot holds no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty() && self.groupings.is_empty()
    }
}

//! Primary rule matching.
//!
//! Given a ruleset snapshot and a request, the matching engine expands the
//! subject's effective roles (one hop of grouping rules), then tests every
//! grant rule for a structural match on subject, object, action and context
//! predicate. Deny wins: an explicit denial is never overridden by a broader
//! allow.
//!
//! A result with `allowed == false` and an empty `applied` list is
//! *inconclusive* (no rule said anything about the request) and the engine
//! facade continues with the aliased retry and wildcard fallback stages.

use time::OffsetDateTime;

use crate::config::BusinessHours;
use crate::policy::context::AuthorizationRequest;
use crate::policy::predicate::PredicateEvaluator;
use crate::policy::rule::{Effect, PolicyRule};
use crate::policy::ruleset::RuleSet;

/// Match a rule field against a request value.
///
/// `*` matches anything; a trailing `*` matches any prefix-sharing value;
/// anything else is literal.
#[must_use]
pub fn field_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    pattern == value
}

// =============================================================================
// Match Outcome
// =============================================================================

/// Result of the primary matching stage.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Whether at least one allow rule matched and no deny rule did.
    pub allowed: bool,

    /// Descriptions of every rule (allow and deny) that structurally
    /// matched. A matching deny therefore makes the outcome conclusive.
    pub applied: Vec<String>,
}

impl MatchOutcome {
    /// No rule said anything about this request.
    #[must_use]
    pub fn is_inconclusive(&self) -> bool {
        !self.allowed && self.applied.is_empty()
    }
}

// =============================================================================
// Matching Engine
// =============================================================================

/// Evaluates requests against a ruleset snapshot.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    predicates: PredicateEvaluator,
}

impl MatchingEngine {
    /// Create an engine with the given business-hours window for `time`
    /// predicates.
    #[must_use]
    pub fn new(business_hours: BusinessHours) -> Self {
        Self {
            predicates: PredicateEvaluator::new(business_hours),
        }
    }

    /// Evaluate a request against the snapshot.
    ///
    /// Deterministic for a fixed ruleset, request, and `now`.
    #[must_use]
    pub fn evaluate(
        &self,
        ruleset: &RuleSet,
        request: &AuthorizationRequest,
        now: OffsetDateTime,
    ) -> MatchOutcome {
        let roles = ruleset.roles_for(&request.subject);

        let mut has_allow = false;
        let mut has_deny = false;
        let mut applied = Vec::new();

        for rule in ruleset.grants() {
            if !self.rule_matches(rule, request, roles, now) {
                continue;
            }

            applied.push(rule.describe());
            match rule.effect {
                Effect::Allow => has_allow = true,
                Effect::Deny => {
                    tracing::debug!(rule = %rule.describe(), subject = %request.subject, "deny rule matched");
                    has_deny = true;
                }
            }
        }

        MatchOutcome {
            allowed: has_allow && !has_deny,
            applied,
        }
    }

    fn rule_matches(
        &self,
        rule: &PolicyRule,
        request: &AuthorizationRequest,
        roles: &[String],
        now: OffsetDateTime,
    ) -> bool {
        let subject_matches = field_matches(&rule.subject, &request.subject)
            || roles.iter().any(|role| field_matches(&rule.subject, role));

        subject_matches
            && field_matches(&rule.object, &request.object)
            && field_matches(&rule.action, &request.action)
            && self
                .predicates
                .matches(&request.context, rule.predicate.as_ref(), now)
    }
}

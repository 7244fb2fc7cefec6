//! Wildcard fallback scan.
//!
//! Last stage of the evaluation pipeline. When neither the primary match nor
//! the aliased retry produced a conclusive outcome, the fallback walks the
//! grant rules once more looking for an *allow* rule that carries a wildcard
//! in at least one field and whose fields cover the request. It exists to
//! catch coarse catch-all policies (`*`, `doc:*`) that the stricter stages
//! missed.
//!
//! Two deliberate restrictions keep the stage narrow:
//!
//! - Deny rules are never considered. A deny that structurally matches the
//!   request already made the earlier stages conclusive, so the fallback can
//!   only widen access that nothing denies.
//! - Fully literal rules are never considered. An exact rule either matched
//!   in the primary stage or was rejected by its context predicate; the
//!   fallback must not resurrect it.

use crate::policy::context::AuthorizationRequest;
use crate::policy::matcher::field_matches;
use crate::policy::rule::{Effect, PolicyRule};
use crate::policy::ruleset::RuleSet;

/// Find the first wildcard-bearing allow rule whose fields cover the request.
///
/// Returns `None` when no such grant applies; the engine then reports an
/// inconclusive denial.
#[must_use]
pub fn scan<'a>(ruleset: &'a RuleSet, request: &AuthorizationRequest) -> Option<&'a PolicyRule> {
    ruleset.grants().iter().find(|rule| {
        rule.effect == Effect::Allow
            && has_wildcard(rule)
            && field_matches(&rule.subject, &request.subject)
            && field_matches(&rule.object, &request.object)
            && field_matches(&rule.action, &request.action)
    })
}

fn has_wildcard(rule: &PolicyRule) -> bool {
    rule.subject.contains('*') || rule.object.contains('*') || rule.action.contains('*')
}

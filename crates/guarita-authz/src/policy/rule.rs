//! Policy rule model and persisted row shape.
//!
//! Two kinds of rules exist:
//!
//! - **Grant** rules express an allow/deny outcome for a
//!   subject/object/action triple, optionally gated by a JSON context
//!   predicate.
//! - **Grouping** rules express that a principal inherits a role's grant
//!   rules; their `object` field holds the role name and the remaining
//!   fields are unused.
//!
//! Rules travel to and from the policy store as [`PolicyRow`]: a `kind`
//! discriminator plus six positional string fields (`v0`..`v5`), matching the
//! relational table layout. String fields are sanitized before a rule is
//! trusted; a row whose predicate fails to parse as a JSON object never
//! enters the active ruleset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthzResult;
use crate::error::AuthzError;

// =============================================================================
// Effect
// =============================================================================

/// Outcome a grant rule produces when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The matching request is permitted.
    Allow,
    /// The matching request is refused. Deny always wins over allow.
    Deny,
}

impl Effect {
    /// Wire representation (`"allow"` / `"deny"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    /// Parse the wire representation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for anything other than `"allow"` or `"deny"`.
    pub fn parse(s: &str) -> AuthzResult<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(AuthzError::invalid_policy(format!(
                "unknown effect '{other}', expected 'allow' or 'deny'"
            ))),
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rule Kind
// =============================================================================

/// Discriminator between grant and grouping rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Allow/deny rule for a subject/object/action triple.
    Grant,
    /// Role membership fact: `subject` is grouped into role `object`.
    Grouping,
}

impl RuleKind {
    /// Wire representation (`"grant"` / `"grouping"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Grouping => "grouping",
        }
    }

    /// Parse the wire representation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for an unknown discriminator.
    pub fn parse(s: &str) -> AuthzResult<Self> {
        match s {
            "grant" => Ok(Self::Grant),
            "grouping" => Ok(Self::Grouping),
            other => Err(AuthzError::invalid_policy(format!(
                "unknown rule kind '{other}', expected 'grant' or 'grouping'"
            ))),
        }
    }
}

// =============================================================================
// Policy Rule
// =============================================================================

/// A single policy rule.
///
/// `subject`, `object` and `action` may end in `*` for a prefix wildcard, or
/// be the literal `*` matching anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Grant or grouping.
    pub kind: RuleKind,

    /// Principal the rule applies to (or is grouped by).
    pub subject: String,

    /// Resource the rule covers; role name for grouping rules.
    pub object: String,

    /// Action the rule covers; unused for grouping rules.
    pub action: String,

    /// Allow or deny; meaningful for grant rules only.
    pub effect: Effect,

    /// Optional attribute predicate, conjunctive over its keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Map<String, Value>>,
}

impl PolicyRule {
    /// Create a grant rule without a context predicate.
    #[must_use]
    pub fn grant(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            kind: RuleKind::Grant,
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            effect,
            predicate: None,
        }
    }

    /// Create a grouping rule: `principal` inherits `role`.
    #[must_use]
    pub fn grouping(principal: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Grouping,
            subject: principal.into(),
            object: role.into(),
            action: String::new(),
            effect: Effect::Allow,
            predicate: None,
        }
    }

    /// Attach a context predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Map<String, Value>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Return a copy with all string fields stripped of control characters.
    ///
    /// NUL, TAB, LF and CR must never reach the matcher or the store; a row
    /// authored with an embedded newline would corrupt positional parsing.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.subject = sanitize(&self.subject);
        self.object = sanitize(&self.object);
        self.action = sanitize(&self.action);
        self
    }

    /// Check structural validity of the rule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` when the subject or object is empty, or when a
    /// grant rule lacks an action.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.subject.is_empty() {
            return Err(AuthzError::invalid_policy("rule subject is empty"));
        }
        if self.object.is_empty() {
            return Err(AuthzError::invalid_policy("rule object is empty"));
        }
        if self.kind == RuleKind::Grant && self.action.is_empty() {
            return Err(AuthzError::invalid_policy("grant rule action is empty"));
        }
        Ok(())
    }

    /// Whether two rules are the same policy fact (used for insert dedupe).
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.subject == other.subject
            && self.object == other.object
            && self.action == other.action
            && self.effect == other.effect
            && self.predicate == other.predicate
    }

    /// Human-readable form recorded in `appliedPolicies` and audit output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.kind {
            RuleKind::Grant => format!(
                "{}, {}, {}, {}",
                self.subject, self.object, self.action, self.effect
            ),
            RuleKind::Grouping => format!("g, {}, {}", self.subject, self.object),
        }
    }
}

/// Strip the control characters that must never appear in a policy field.
#[must_use]
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\0' | '\t' | '\n' | '\r'))
        .collect()
}

// =============================================================================
// Persisted Row
// =============================================================================

/// Persisted shape of a policy rule: a kind discriminator plus six
/// positional string fields. `v5` is reserved: accepted on load, never
/// written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRow {
    /// `"grant"` or `"grouping"`.
    pub kind: String,
    /// Subject.
    pub v0: Option<String>,
    /// Object, or role name for grouping rows.
    pub v1: Option<String>,
    /// Action.
    pub v2: Option<String>,
    /// Effect (`"allow"` / `"deny"`).
    pub v3: Option<String>,
    /// Optional JSON context predicate.
    pub v4: Option<String>,
    /// Reserved.
    pub v5: Option<String>,
}

impl PolicyRow {
    /// Convert a row into a trusted rule.
    ///
    /// Fields are sanitized, the effect parsed, and `v4` (when present and
    /// non-empty) must parse as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` when the kind or effect is unknown, a
    /// mandatory field is missing, or the predicate is malformed.
    pub fn to_rule(&self) -> AuthzResult<PolicyRule> {
        let kind = RuleKind::parse(&self.kind)?;
        let subject = sanitize(self.v0.as_deref().unwrap_or_default());
        let object = sanitize(self.v1.as_deref().unwrap_or_default());

        let rule = match kind {
            RuleKind::Grouping => PolicyRule::grouping(subject, object),
            RuleKind::Grant => {
                let action = sanitize(self.v2.as_deref().unwrap_or_default());
                let effect = Effect::parse(self.v3.as_deref().unwrap_or("allow"))?;
                let mut rule = PolicyRule::grant(subject, object, action, effect);
                if let Some(raw) = self.v4.as_deref() {
                    if let Some(predicate) = parse_predicate(raw)? {
                        rule.predicate = Some(predicate);
                    }
                }
                rule
            }
        };

        rule.validate()?;
        Ok(rule)
    }

    /// Convert a rule into its persisted row shape.
    #[must_use]
    pub fn from_rule(rule: &PolicyRule) -> Self {
        Self {
            kind: rule.kind.as_str().to_string(),
            v0: Some(rule.subject.clone()),
            v1: Some(rule.object.clone()),
            v2: match rule.kind {
                RuleKind::Grant => Some(rule.action.clone()),
                RuleKind::Grouping => None,
            },
            v3: match rule.kind {
                RuleKind::Grant => Some(rule.effect.as_str().to_string()),
                RuleKind::Grouping => None,
            },
            v4: rule
                .predicate
                .as_ref()
                .map(|p| Value::Object(p.clone()).to_string()),
            v5: None,
        }
    }
}

/// Parse an optional JSON context predicate.
///
/// Empty strings and the literal `"*"` mean "no predicate".
///
/// # Errors
///
/// Returns `InvalidPolicy` when the value is not a JSON object.
pub fn parse_predicate(raw: &str) -> AuthzResult<Option<Map<String, Value>>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(AuthzError::invalid_policy(format!(
            "context predicate must be a JSON object, got {other}"
        ))),
        Err(e) => Err(AuthzError::invalid_policy(format!(
            "context predicate is not valid JSON: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize("alice\n@x.com\r"), "alice@x.com");
        assert_eq!(sanitize("doc:\t1\0"), "doc:1");
        assert_eq!(sanitize("clean"), "clean");
    }

    #[test]
    fn effect_parses_and_rejects() {
        assert_eq!(Effect::parse("allow").unwrap(), Effect::Allow);
        assert_eq!(Effect::parse("deny").unwrap(), Effect::Deny);
        assert!(Effect::parse("maybe").is_err());
    }

    #[test]
    fn row_round_trips_a_grant_rule() {
        let mut predicate = Map::new();
        predicate.insert("time".into(), Value::String("business_hours".into()));
        let rule = PolicyRule::grant("alice@x.com", "doc:1", "read", Effect::Allow)
            .with_predicate(predicate);

        let row = PolicyRow::from_rule(&rule);
        assert_eq!(row.kind, "grant");
        assert_eq!(row.v0.as_deref(), Some("alice@x.com"));
        assert_eq!(row.v3.as_deref(), Some("allow"));

        let back = row.to_rule().unwrap();
        assert!(back.is_equivalent(&rule));
    }

    #[test]
    fn reserved_column_is_never_written() {
        let grant = PolicyRule::grant("alice", "doc:1", "read", Effect::Allow);
        assert_eq!(PolicyRow::from_rule(&grant).v5, None);

        // A loaded value in the reserved column does not survive the
        // rule model.
        let mut row = PolicyRow::from_rule(&grant);
        row.v5 = Some("extra".into());
        let back = row.to_rule().unwrap();
        assert_eq!(PolicyRow::from_rule(&back).v5, None);
    }

    #[test]
    fn row_round_trips_a_grouping_rule() {
        let rule = PolicyRule::grouping("alice@x.com", "role:admin");
        let row = PolicyRow::from_rule(&rule);
        assert_eq!(row.kind, "grouping");
        assert_eq!(row.v1.as_deref(), Some("role:admin"));

        let back = row.to_rule().unwrap();
        assert_eq!(back.kind, RuleKind::Grouping);
        assert_eq!(back.object, "role:admin");
    }

    #[test]
    fn malformed_predicate_is_rejected() {
        let row = PolicyRow {
            kind: "grant".into(),
            v0: Some("alice".into()),
            v1: Some("doc:1".into()),
            v2: Some("read".into()),
            v3: Some("allow".into()),
            v4: Some("{not json".into()),
            v5: None,
        };
        let err = row.to_rule().unwrap_err();
        assert!(err.is_invalid_policy());
    }

    #[test]
    fn non_object_predicate_is_rejected() {
        assert!(parse_predicate("[1, 2]").is_err());
        assert!(parse_predicate("\"string\"").is_err());
    }

    #[test]
    fn star_and_empty_predicates_mean_none() {
        assert_eq!(parse_predicate("").unwrap(), None);
        assert_eq!(parse_predicate("*").unwrap(), None);
        assert_eq!(parse_predicate("  ").unwrap(), None);
    }

    #[test]
    fn row_fields_are_sanitized_on_load() {
        let row = PolicyRow {
            kind: "grant".into(),
            v0: Some("bob\n".into()),
            v1: Some("doc:2\t".into()),
            v2: Some("read".into()),
            v3: Some("deny".into()),
            v4: None,
            v5: None,
        };
        let rule = row.to_rule().unwrap();
        assert_eq!(rule.subject, "bob");
        assert_eq!(rule.object, "doc:2");
        assert_eq!(rule.effect, Effect::Deny);
    }

    #[test]
    fn validate_rejects_empty_fields() {
        assert!(PolicyRule::grant("", "doc:1", "read", Effect::Allow)
            .validate()
            .is_err());
        assert!(PolicyRule::grant("alice", "doc:1", "", Effect::Allow)
            .validate()
            .is_err());
        assert!(PolicyRule::grouping("alice", "").validate().is_err());
    }

    #[test]
    fn describe_is_stable() {
        let rule = PolicyRule::grant("alice", "doc:1", "read", Effect::Deny);
        assert_eq!(rule.describe(), "alice, doc:1, read, deny");
        let grouping = PolicyRule::grouping("alice", "role:admin");
        assert_eq!(grouping.describe(), "g, alice, role:admin");
    }
}

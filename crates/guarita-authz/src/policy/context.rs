//! Request context representation.
//!
//! Callers supply an attribute map alongside every authorization request
//! (client IP, user agent, request time, department, anything else a policy
//! predicate may want to inspect). Each value is a tagged variant so
//! predicates can compare without re-parsing, while unknown keys keep plain
//! exact-match semantics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A single context attribute value.
///
/// Deserialization is untagged: booleans and numbers map directly, strings
/// that parse as RFC 3339 instants become timestamps, everything else stays a
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean attribute (e.g. `sensitive`).
    Bool(bool),
    /// Numeric attribute.
    Number(f64),
    /// Instant attribute (RFC 3339 on the wire).
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Free-form string attribute.
    String(String),
}

impl AttrValue {
    /// String view, when this is a string attribute.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the attribute as an instant.
    ///
    /// Timestamps return directly; strings are parsed as RFC 3339.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<OffsetDateTime> for AttrValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// Attribute map attached to an authorization request.
///
/// Ordered map so serialized decisions and audit records are deterministic.
pub type Context = BTreeMap<String, AttrValue>;

// =============================================================================
// Authorization Request
// =============================================================================

/// One (subject, object, action, context) tuple to authorize.
///
/// `subject` is caller-supplied and may be either identifier namespace: an
/// email-like handle or the opaque internal form (`user:{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Requesting principal.
    pub subject: String,

    /// Resource being accessed.
    pub object: String,

    /// Action being performed.
    pub action: String,

    /// Environmental attributes.
    #[serde(default)]
    pub context: Context,
}

impl AuthorizationRequest {
    /// Build a request with an empty context.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            context: Context::new(),
        }
    }

    /// Attach a context attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The same request under a different subject identifier, used by the
    /// aliased retry stage.
    #[must_use]
    pub fn with_subject(&self, subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            object: self.object.clone(),
            action: self.action.clone(),
            context: self.context.clone(),
        }
    }
}

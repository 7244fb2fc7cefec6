//! Authorization error types.
//!
//! This module defines all error types that can occur during authorization
//! operations. The taxonomy is deliberately small: failures on optional
//! enrichment paths (identity resolution, audit) are swallowed and logged by
//! their callers, while failures on the mandatory path (loading the ruleset)
//! surface as a fail-closed denial.

/// Errors that can occur during authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The policy store cannot be reached or a store operation failed.
    #[error("Policy store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the store failure.
        message: String,
    },

    /// A policy rule is malformed (e.g. its context predicate is not valid
    /// JSON). The rule is rejected; other rules are unaffected.
    #[error("Invalid policy: {message}")]
    InvalidPolicy {
        /// Description of why the policy is invalid.
        message: String,
    },

    /// The user directory could not resolve an identity alias. Callers
    /// proceed with the original subject form only.
    #[error("Directory lookup failed: {message}")]
    DirectoryLookupFailed {
        /// Description of the lookup failure.
        message: String,
    },

    /// Writing a decision record to the audit sink failed. Logged locally,
    /// never propagated to the caller and never changes the decision.
    #[error("Audit sink failed: {message}")]
    AuditSinkFailed {
        /// Description of the sink failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthzError {
    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPolicy` error.
    #[must_use]
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }

    /// Creates a new `DirectoryLookupFailed` error.
    #[must_use]
    pub fn directory_lookup_failed(message: impl Into<String>) -> Self {
        Self::DirectoryLookupFailed {
            message: message.into(),
        }
    }

    /// Creates a new `AuditSinkFailed` error.
    #[must_use]
    pub fn audit_sink_failed(message: impl Into<String>) -> Self {
        Self::AuditSinkFailed {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a `StoreUnavailable` error.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns `true` if this is an `InvalidPolicy` error.
    #[must_use]
    pub fn is_invalid_policy(&self) -> bool {
        matches!(self, Self::InvalidPolicy { .. })
    }
}

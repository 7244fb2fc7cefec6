//! Audit trail for authorization decisions.
//!
//! Every decision, allowed or denied, conclusive or not, produces one
//! [`AuditRecord`] handed to the configured [`AuditSink`]. Auditing is
//! strictly off the decision path: a sink failure or timeout is logged and
//! swallowed, and the decision already made is returned unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::AuthzResult;
use crate::config::AuthzConfig;
use crate::policy::context::{AttrValue, AuthorizationRequest};

/// One audited authorization decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Subject exactly as presented in the request.
    pub subject: String,

    /// Requested object.
    pub object: String,

    /// Requested action.
    pub action: String,

    /// Final decision.
    pub allowed: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Client IP, when the request context carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Client user agent, when the request context carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Opaque user id, when the subject used the `user:{id}` form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When the decision was made.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AuditRecord {
    /// Build a record from a request and its decision.
    #[must_use]
    pub fn from_decision(
        request: &AuthorizationRequest,
        allowed: bool,
        reason: impl Into<String>,
        at: OffsetDateTime,
    ) -> Self {
        Self {
            subject: request.subject.clone(),
            object: request.object.clone(),
            action: request.action.clone(),
            allowed,
            reason: reason.into(),
            ip: context_string(request, "ip"),
            user_agent: context_string(request, "userAgent"),
            user_id: request
                .subject
                .strip_prefix("user:")
                .map(ToString::to_string),
            created_at: at,
        }
    }
}

fn context_string(request: &AuthorizationRequest, key: &str) -> Option<String> {
    request
        .context
        .get(key)
        .and_then(AttrValue::as_str)
        .map(ToString::to_string)
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns `AuditSinkFailed` when the record cannot be written.
    async fn write(&self, record: &AuditRecord) -> AuthzResult<()>;
}

/// Sink that emits each record as a structured log event.
///
/// The default when no persistent sink is configured; keeps the audit trail
/// in the process logs.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: &AuditRecord) -> AuthzResult<()> {
        tracing::info!(
            subject = %record.subject,
            object = %record.object,
            action = %record.action,
            allowed = record.allowed,
            reason = %record.reason,
            ip = record.ip.as_deref().unwrap_or("-"),
            "authorization decision"
        );
        Ok(())
    }
}

/// Fire-and-forget wrapper around a sink.
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
    timeout: std::time::Duration,
}

impl AuditEmitter {
    /// Create an emitter over the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: &AuthzConfig) -> Self {
        Self {
            sink,
            timeout: config.audit_timeout,
        }
    }

    /// Emit a record. Failures and timeouts are logged, never propagated.
    pub async fn emit(&self, record: &AuditRecord) {
        match tokio::time::timeout(self.timeout, self.sink.write(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(subject = %record.subject, error = %e, "audit write failed");
            }
            Err(_) => {
                tracing::error!(subject = %record.subject, timeout = ?self.timeout, "audit write timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn write(&self, _record: &AuditRecord) -> AuthzResult<()> {
            Err(AuthzError::audit_sink_failed("disk full"))
        }
    }

    struct CountingSink {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl AuditSink for CountingSink {
        async fn write(&self, _record: &AuditRecord) -> AuthzResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        let request = AuthorizationRequest::new("user:u-1", "doc:1", "read")
            .with_attr("ip", "10.0.0.1")
            .with_attr("userAgent", "curl/8.0");
        AuditRecord::from_decision(&request, true, "granted by policy", datetime!(2024-01-16 10:00 UTC))
    }

    #[test]
    fn record_captures_context_attributes() {
        let r = record();
        assert_eq!(r.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(r.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(r.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn email_subject_has_no_user_id() {
        let request = AuthorizationRequest::new("alice@x.com", "doc:1", "read");
        let r = AuditRecord::from_decision(&request, false, "no matching policy", datetime!(2024-01-16 10:00 UTC));
        assert!(r.user_id.is_none());
        assert!(r.ip.is_none());
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["userAgent"], "curl/8.0");
        assert_eq!(json["userId"], "u-1");
        assert!(json["createdAt"].as_str().unwrap().starts_with("2024-01-16"));
    }

    #[tokio::test]
    async fn emitter_swallows_sink_failures() {
        let emitter = AuditEmitter::new(Arc::new(FailingSink), &AuthzConfig::default());
        // Must not panic or propagate.
        emitter.emit(&record()).await;
    }

    #[tokio::test]
    async fn emitter_delivers_to_sink() {
        let sink = Arc::new(CountingSink {
            writes: AtomicUsize::new(0),
        });
        let emitter = AuditEmitter::new(sink.clone(), &AuthzConfig::default());
        emitter.emit(&record()).await;
        emitter.emit(&record()).await;
        assert_eq!(sink.writes.load(Ordering::SeqCst), 2);
    }
}

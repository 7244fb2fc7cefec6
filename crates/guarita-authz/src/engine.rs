//! Authorization engine facade.
//!
//! [`AuthzEngine`] wires the cache, matcher, identity normalizer and audit
//! emitter into the three-stage evaluation pipeline:
//!
//! 1. **Primary match** against the current ruleset snapshot. Conclusive if
//!    any rule (allow or deny) structurally matched.
//! 2. **Aliased retry**: the subject's alternate identity form (email vs
//!    `user:{id}`) is resolved through the directory and the match repeated.
//! 3. **Wildcard fallback**: a grant-only scan that catches broad structural
//!    allows the stricter stages missed.
//!
//! The pipeline never returns an error to the caller: a store failure is a
//! fail-closed denial, directory and audit failures degrade to warnings.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;

use crate::AuthzResult;
use crate::audit::{AuditEmitter, AuditRecord, AuditSink, TracingAuditSink};
use crate::config::AuthzConfig;
use crate::identity::{IdentityNormalizer, UserDirectory};
use crate::policy::cache::{RuleSetCache, RuleSetCacheStats};
use crate::policy::context::{AuthorizationRequest, Context};
use crate::policy::matcher::{MatchOutcome, MatchingEngine};
use crate::policy::rule::{Effect, PolicyRule, RuleKind};
use crate::policy::{fallback, ruleset::RuleSet};
use crate::storage::PolicyStore;

// =============================================================================
// Decision
// =============================================================================

/// Outcome of one authorization check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    /// Whether the request is permitted.
    pub allowed: bool,

    /// Human-readable reason. Distinguishes an explicit denial
    /// (`denied by policy`) from the absence of any applicable rule
    /// (`no matching policy`) and from infrastructure failure.
    pub reason: String,

    /// Descriptions of the rules that produced the decision.
    pub applied_policies: Vec<String>,

    /// Context attributes the request carried.
    pub context: Context,

    /// When the decision was made.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Wall-clock evaluation time in milliseconds.
    pub response_time_ms: f64,
}

/// Operational counters exposed on the stats surface.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Ruleset cache state.
    pub cache: RuleSetCacheStats,

    /// Live entries in the identity alias cache.
    pub cached_aliases: usize,
}

// =============================================================================
// Engine
// =============================================================================

/// The authorization engine.
///
/// Cheap to share behind an `Arc`; all interior state is the ruleset cache
/// and the alias cache, both internally synchronized.
pub struct AuthzEngine {
    store: Arc<dyn PolicyStore>,
    cache: RuleSetCache,
    matcher: MatchingEngine,
    normalizer: Option<IdentityNormalizer>,
    audit: AuditEmitter,
}

impl AuthzEngine {
    /// Create an engine over a policy store.
    ///
    /// Without further configuration the engine has no identity directory
    /// (the aliased retry stage is skipped) and audits to the process log.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, config: &AuthzConfig) -> Self {
        Self {
            cache: RuleSetCache::new(Arc::clone(&store), config),
            matcher: MatchingEngine::new(config.business_hours.clone()),
            normalizer: None,
            audit: AuditEmitter::new(Arc::new(TracingAuditSink), config),
            store,
        }
    }

    /// Enable the aliased retry stage with the given user directory.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>, config: &AuthzConfig) -> Self {
        self.normalizer = Some(IdentityNormalizer::new(directory, config));
        self
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>, config: &AuthzConfig) -> Self {
        self.audit = AuditEmitter::new(sink, config);
        self
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Run the full evaluation pipeline for one request.
    ///
    /// Never fails: infrastructure errors produce a fail-closed denial with
    /// the cause in `reason`. Every call emits exactly one audit record.
    pub async fn check_permission(&self, request: &AuthorizationRequest) -> AuthorizationDecision {
        let started = Instant::now();
        let now = OffsetDateTime::now_utc();

        let snapshot = match self.cache.current().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(subject = %request.subject, error = %e, "denying request, ruleset unavailable");
                let decision =
                    self.decision(false, e.to_string(), Vec::new(), request, now, started);
                self.audit_decision(request, &decision).await;
                return decision;
            }
        };

        let (allowed, reason, applied) = self.evaluate(&snapshot, request, now).await;
        let decision = self.decision(allowed, reason, applied, request, now, started);
        self.audit_decision(request, &decision).await;
        decision
    }

    async fn evaluate(
        &self,
        snapshot: &RuleSet,
        request: &AuthorizationRequest,
        now: OffsetDateTime,
    ) -> (bool, String, Vec<String>) {
        // Stage 1: primary match.
        let primary = self.matcher.evaluate(snapshot, request, now);
        if !primary.is_inconclusive() {
            return Self::conclusive(primary);
        }

        // Stage 2: retry under the subject's alternate identity form.
        let mut aliased_request = None;
        if let Some(normalizer) = &self.normalizer {
            if let Some(alternate) = normalizer.alternate_for(&request.subject).await {
                tracing::debug!(subject = %request.subject, alternate = %alternate, "retrying with aliased subject");
                let retry = request.with_subject(alternate);
                let outcome = self.matcher.evaluate(snapshot, &retry, now);
                if !outcome.is_inconclusive() {
                    return Self::conclusive(outcome);
                }
                aliased_request = Some(retry);
            }
        }

        // Stage 3: grant-only wildcard fallback, under both subject forms.
        let hit = fallback::scan(snapshot, request).or_else(|| {
            aliased_request
                .as_ref()
                .and_then(|aliased| fallback::scan(snapshot, aliased))
        });
        if let Some(rule) = hit {
            return (
                true,
                "granted by wildcard fallback".to_string(),
                vec![rule.describe()],
            );
        }

        (false, "no matching policy".to_string(), Vec::new())
    }

    fn conclusive(outcome: MatchOutcome) -> (bool, String, Vec<String>) {
        let reason = if outcome.allowed {
            "granted by policy"
        } else {
            "denied by policy"
        };
        (outcome.allowed, reason.to_string(), outcome.applied)
    }

    fn decision(
        &self,
        allowed: bool,
        reason: String,
        applied_policies: Vec<String>,
        request: &AuthorizationRequest,
        now: OffsetDateTime,
        started: Instant,
    ) -> AuthorizationDecision {
        AuthorizationDecision {
            allowed,
            reason,
            applied_policies,
            context: request.context.clone(),
            timestamp: now,
            response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    async fn audit_decision(&self, request: &AuthorizationRequest, decision: &AuthorizationDecision) {
        let record = AuditRecord::from_decision(
            request,
            decision.allowed,
            decision.reason.clone(),
            decision.timestamp,
        );
        self.audit.emit(&record).await;
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Persist a grant rule and invalidate the cache.
    ///
    /// Returns `false` when an equivalent rule already exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for a malformed rule, `StoreUnavailable` when
    /// the store rejects the write.
    pub async fn add_policy(&self, rule: PolicyRule) -> AuthzResult<bool> {
        if rule.kind != RuleKind::Grant {
            return Err(crate::error::AuthzError::invalid_policy(
                "add_policy expects a grant rule",
            ));
        }
        let inserted = self.store.insert(&rule).await?;
        if inserted {
            self.cache.invalidate().await;
            tracing::info!(rule = %rule.describe(), "policy added");
        }
        Ok(inserted)
    }

    /// Persist a grouping rule (principal inherits role) and invalidate the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for empty fields, `StoreUnavailable` when the
    /// store rejects the write.
    pub async fn add_grouping(
        &self,
        principal: impl Into<String>,
        role: impl Into<String>,
    ) -> AuthzResult<bool> {
        let rule = PolicyRule::grouping(principal, role);
        let inserted = self.store.insert(&rule).await?;
        if inserted {
            self.cache.invalidate().await;
            tracing::info!(rule = %rule.describe(), "grouping added");
        }
        Ok(inserted)
    }

    /// Remove the grant rule matching the given tuple; invalidates the cache
    /// when a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when the store cannot be reached.
    pub async fn remove_policy(
        &self,
        subject: &str,
        object: &str,
        action: &str,
        effect: Effect,
    ) -> AuthzResult<bool> {
        let removed = self.store.remove(subject, object, action, effect).await?;
        if removed {
            self.cache.invalidate().await;
            tracing::info!(subject, object, action, effect = %effect, "policy removed");
        }
        Ok(removed)
    }

    /// Remove a grouping rule; invalidates the cache when a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when the store cannot be reached.
    pub async fn remove_grouping(&self, principal: &str, role: &str) -> AuthzResult<bool> {
        let removed = self.store.remove_grouping(principal, role).await?;
        if removed {
            self.cache.invalidate().await;
            tracing::info!(principal, role, "grouping removed");
        }
        Ok(removed)
    }

    /// List the active grant rules as positional string tuples
    /// (subject, object, action, effect, predicate JSON when present).
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when no snapshot can be obtained.
    pub async fn list_policies(&self) -> AuthzResult<Vec<Vec<String>>> {
        let snapshot = self.cache.current().await?;
        Ok(snapshot
            .grants()
            .iter()
            .map(|rule| {
                let mut row = vec![
                    rule.subject.clone(),
                    rule.object.clone(),
                    rule.action.clone(),
                    rule.effect.as_str().to_string(),
                ];
                if let Some(predicate) = &rule.predicate {
                    row.push(serde_json::Value::Object(predicate.clone()).to_string());
                }
                row
            })
            .collect())
    }

    /// List the active grouping rules as (principal, role) pairs.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when no snapshot can be obtained.
    pub async fn list_groupings(&self) -> AuthzResult<Vec<Vec<String>>> {
        let snapshot = self.cache.current().await?;
        Ok(snapshot
            .groupings()
            .iter()
            .map(|rule| vec![rule.subject.clone(), rule.object.clone()])
            .collect())
    }

    /// Force an immediate reload from the store. Returns whether the reload
    /// succeeded; a failure leaves the previous snapshot serving.
    pub async fn reload(&self) -> bool {
        match self.cache.refresh().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "manual reload failed");
                false
            }
        }
    }

    /// Operational statistics.
    pub async fn stats(&self) -> EngineStats {
        let cached_aliases = match &self.normalizer {
            Some(normalizer) => normalizer.cached_aliases().await,
            None => 0,
        };
        EngineStats {
            cache: self.cache.stats().await,
            cached_aliases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::storage::MemoryPolicyStore;
    use async_trait::async_trait;

    struct StubDirectory;

    #[async_trait]
    impl UserDirectory for StubDirectory {
        async fn id_for_email(&self, email: &str) -> AuthzResult<Option<String>> {
            Ok((email == "alice@x.com").then(|| "42".to_string()))
        }

        async fn email_for_id(&self, id: &str) -> AuthzResult<Option<String>> {
            Ok((id == "42").then(|| "alice@x.com".to_string()))
        }
    }

    struct DownStore;

    #[async_trait]
    impl crate::storage::PolicyStore for DownStore {
        async fn load_all(&self) -> AuthzResult<Vec<PolicyRule>> {
            Err(AuthzError::store_unavailable("connection refused"))
        }

        async fn insert(&self, _rule: &PolicyRule) -> AuthzResult<bool> {
            Err(AuthzError::store_unavailable("connection refused"))
        }

        async fn remove(
            &self,
            _subject: &str,
            _object: &str,
            _action: &str,
            _effect: Effect,
        ) -> AuthzResult<bool> {
            Err(AuthzError::store_unavailable("connection refused"))
        }

        async fn remove_grouping(&self, _principal: &str, _role: &str) -> AuthzResult<bool> {
            Err(AuthzError::store_unavailable("connection refused"))
        }
    }

    fn engine_with(rules: Vec<PolicyRule>) -> AuthzEngine {
        let config = AuthzConfig::default();
        AuthzEngine::new(Arc::new(MemoryPolicyStore::with_rules(rules)), &config)
    }

    #[tokio::test]
    async fn exact_grant_is_allowed() {
        let engine = engine_with(vec![PolicyRule::grant(
            "alice@x.com",
            "doc:1",
            "read",
            Effect::Allow,
        )]);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("alice@x.com", "doc:1", "read"))
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.reason, "granted by policy");
        assert_eq!(decision.applied_policies, ["alice@x.com, doc:1, read, allow"]);
    }

    #[tokio::test]
    async fn unmatched_request_is_denied_without_applied_policies() {
        let engine = engine_with(vec![PolicyRule::grant(
            "alice@x.com",
            "doc:1",
            "read",
            Effect::Allow,
        )]);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("alice@x.com", "doc:1", "write"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no matching policy");
        assert!(decision.applied_policies.is_empty());
    }

    #[tokio::test]
    async fn explicit_deny_is_conclusive() {
        let engine = engine_with(vec![
            PolicyRule::grant("*", "doc:2", "read", Effect::Allow),
            PolicyRule::grant("bob", "doc:2", "read", Effect::Deny),
        ]);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("bob", "doc:2", "read"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "denied by policy");
        assert_eq!(decision.applied_policies.len(), 2);
    }

    #[tokio::test]
    async fn aliased_retry_finds_the_other_namespace() {
        let config = AuthzConfig::default();
        let engine = engine_with(vec![PolicyRule::grant(
            "user:42",
            "doc:1",
            "read",
            Effect::Allow,
        )])
        .with_directory(Arc::new(StubDirectory), &config);

        let decision = engine
            .check_permission(&AuthorizationRequest::new("alice@x.com", "doc:1", "read"))
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.applied_policies, ["user:42, doc:1, read, allow"]);
    }

    #[tokio::test]
    async fn alias_symmetry_id_to_email() {
        let config = AuthzConfig::default();
        let engine = engine_with(vec![PolicyRule::grant(
            "alice@x.com",
            "doc:1",
            "read",
            Effect::Allow,
        )])
        .with_directory(Arc::new(StubDirectory), &config);

        let decision = engine
            .check_permission(&AuthorizationRequest::new("user:42", "doc:1", "read"))
            .await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn wildcard_fallback_grants_broad_allows() {
        // The predicate makes the primary match inconclusive; the fallback
        // ignores predicates and still finds the structural wildcard allow.
        let rule = PolicyRule::grant("*", "doc:*", "read", Effect::Allow).with_predicate(
            serde_json::json!({"location": "campus"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let engine = engine_with(vec![rule]);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("nobody", "doc:9", "read"))
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.reason, "granted by wildcard fallback");
    }

    #[tokio::test]
    async fn fallback_never_bypasses_a_matching_deny() {
        let engine = engine_with(vec![
            PolicyRule::grant("*", "doc:*", "read", Effect::Allow),
            PolicyRule::grant("mallory", "doc:secret", "read", Effect::Deny),
        ]);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("mallory", "doc:secret", "read"))
            .await;
        // The deny matched in the primary stage, so the outcome was already
        // conclusive and the fallback never ran.
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "denied by policy");
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let config = AuthzConfig::default();
        let engine = AuthzEngine::new(Arc::new(DownStore), &config);
        let decision = engine
            .check_permission(&AuthorizationRequest::new("alice@x.com", "doc:1", "read"))
            .await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Policy store unavailable"));
    }

    #[tokio::test]
    async fn mutations_invalidate_the_cache() {
        let engine = engine_with(vec![]);
        let request = AuthorizationRequest::new("alice@x.com", "doc:1", "read");

        assert!(!engine.check_permission(&request).await.allowed);

        let added = engine
            .add_policy(PolicyRule::grant("alice@x.com", "doc:1", "read", Effect::Allow))
            .await
            .unwrap();
        assert!(added);

        // Visible immediately, no TTL wait.
        assert!(engine.check_permission(&request).await.allowed);

        assert!(engine
            .remove_policy("alice@x.com", "doc:1", "read", Effect::Allow)
            .await
            .unwrap());
        assert!(!engine.check_permission(&request).await.allowed);
    }

    #[tokio::test]
    async fn groupings_manage_role_membership() {
        let engine = engine_with(vec![PolicyRule::grant(
            "role:admin",
            "*",
            "*",
            Effect::Allow,
        )]);
        let request = AuthorizationRequest::new("carol", "anything", "delete");

        // The admin wildcard alone grants nobody in particular; the subject
        // field is a role name, not a star.
        assert!(!engine.check_permission(&request).await.allowed);

        engine.add_grouping("carol", "role:admin").await.unwrap();
        assert!(engine.check_permission(&request).await.allowed);

        engine.remove_grouping("carol", "role:admin").await.unwrap();
        assert!(!engine.check_permission(&request).await.allowed);
    }

    #[tokio::test]
    async fn add_policy_rejects_grouping_rules() {
        let engine = engine_with(vec![]);
        let err = engine
            .add_policy(PolicyRule::grouping("alice", "role:admin"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_policy());
    }

    #[tokio::test]
    async fn list_policies_returns_grant_tuples() {
        let engine = engine_with(vec![
            PolicyRule::grant("alice", "doc:1", "read", Effect::Allow),
            PolicyRule::grouping("alice", "role:admin"),
        ]);
        let policies = engine.list_policies().await.unwrap();
        assert_eq!(policies, [["alice", "doc:1", "read", "allow"]]);

        let groupings = engine.list_groupings().await.unwrap();
        assert_eq!(groupings, [["alice", "role:admin"]]);
    }

    #[tokio::test]
    async fn reload_reports_success() {
        let engine = engine_with(vec![]);
        assert!(engine.reload().await);

        let config = AuthzConfig::default();
        let down = AuthzEngine::new(Arc::new(DownStore), &config);
        assert!(!down.reload().await);
    }

    #[tokio::test]
    async fn stats_expose_cache_counters() {
        let engine = engine_with(vec![PolicyRule::grant(
            "alice",
            "doc:1",
            "read",
            Effect::Allow,
        )]);
        engine.reload().await;
        let stats = engine.stats().await;
        assert_eq!(stats.cache.grant_count, 1);
        assert_eq!(stats.cached_aliases, 0);
    }
}

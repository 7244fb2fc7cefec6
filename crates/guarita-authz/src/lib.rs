//! Attribute-based authorization engine.
//!
//! Evaluates (subject, object, action, context) requests against a set of
//! persisted policy rules:
//!
//! - **Grant rules** allow or deny a subject/object/action triple, with
//!   prefix wildcards and optional JSON context predicates (time windows,
//!   locations, IP ranges).
//! - **Grouping rules** give a principal the grants of a role (one hop, no
//!   nested roles).
//!
//! Evaluation runs a three-stage pipeline (primary match, aliased-subject
//! retry, grant-only wildcard fallback) with deny precedence throughout.
//! Rulesets are cached as immutable snapshots with a TTL; administrative
//! mutations invalidate the cache so changes apply on the next check.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use guarita_authz::config::AuthzConfig;
//! use guarita_authz::engine::AuthzEngine;
//! use guarita_authz::policy::{AuthorizationRequest, Effect, PolicyRule};
//! use guarita_authz::storage::MemoryPolicyStore;
//!
//! # async fn run() {
//! let store = Arc::new(MemoryPolicyStore::with_rules(vec![
//!     PolicyRule::grant("alice@x.com", "doc:*", "read", Effect::Allow),
//! ]));
//! let engine = AuthzEngine::new(store, &AuthzConfig::default());
//!
//! let decision = engine
//!     .check_permission(&AuthorizationRequest::new("alice@x.com", "doc:1", "read"))
//!     .await;
//! assert!(decision.allowed);
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod policy;
pub mod storage;

pub use audit::{AuditEmitter, AuditRecord, AuditSink, TracingAuditSink};
pub use config::{AuthzConfig, BusinessHours};
pub use engine::{AuthorizationDecision, AuthzEngine, EngineStats};
pub use error::AuthzError;
pub use identity::{IdentityNormalizer, UserDirectory};
pub use policy::{AuthorizationRequest, Effect, PolicyRow, PolicyRule, RuleKind};
pub use storage::{MemoryPolicyStore, PolicyStore};

/// Result type used throughout the crate.
pub type AuthzResult<T> = Result<T, AuthzError>;

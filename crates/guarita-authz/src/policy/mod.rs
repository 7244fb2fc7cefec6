//! Policy model and evaluation.
//!
//! The submodules split the evaluation pipeline into its stages:
//!
//! - [`rule`] - the policy row model (grants, groupings, effects)
//! - [`context`] - request attributes and the authorization request type
//! - [`predicate`] - conjunctive context-predicate evaluation
//! - [`ruleset`] - immutable, versioned snapshots of the loaded rules
//! - [`matcher`] - primary structural matching with deny precedence
//! - [`fallback`] - grant-only wildcard scan for inconclusive requests
//! - [`cache`] - TTL-bounded snapshot caching over a [`crate::storage::PolicyStore`]

pub mod cache;
pub mod context;
pub mod fallback;
pub mod matcher;
pub mod predicate;
pub mod rule;
pub mod ruleset;

pub use cache::{RuleSetCache, RuleSetCacheStats};
pub use context::{AttrValue, AuthorizationRequest, Context};
pub use matcher::{MatchOutcome, MatchingEngine, field_matches};
pub use predicate::PredicateEvaluator;
pub use rule::{Effect, PolicyRow, PolicyRule, RuleKind};
pub use ruleset::RuleSet;

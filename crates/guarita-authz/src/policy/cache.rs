//! Ruleset cache with TTL-bounded reload.
//!
//! The cache is the one shared mutable resource of the engine: many
//! concurrent evaluations read the current snapshot while a reload
//! occasionally replaces it wholesale. Readers hold an `Arc<RuleSet>` and
//! observe either the old or the new snapshot, never a partially constructed
//! one. A reload that fails or times out discards its result; the prior
//! snapshot remains valid and is served stale until a later reload succeeds.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::AuthzResult;
use crate::config::AuthzConfig;
use crate::error::AuthzError;
use crate::policy::ruleset::RuleSet;
use crate::storage::PolicyStore;

struct CachedRuleSet {
    snapshot: Option<Arc<RuleSet>>,
    last_refresh: OffsetDateTime,
    version: u64,
}

impl Default for CachedRuleSet {
    fn default() -> Self {
        Self {
            snapshot: None,
            last_refresh: OffsetDateTime::UNIX_EPOCH,
            version: 0,
        }
    }
}

/// TTL-bounded holder of the active [`RuleSet`] snapshot.
pub struct RuleSetCache {
    store: Arc<dyn PolicyStore>,
    inner: RwLock<CachedRuleSet>,
    ttl: Duration,
    store_timeout: std::time::Duration,
}

impl RuleSetCache {
    /// Create a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, config: &AuthzConfig) -> Self {
        Self {
            store,
            inner: RwLock::new(CachedRuleSet::default()),
            ttl: Duration::try_from(config.cache_ttl).unwrap_or(Duration::minutes(5)),
            store_timeout: config.store_timeout,
        }
    }

    /// Get the current snapshot, reloading on first use or TTL expiry.
    ///
    /// When a reload fails but an earlier snapshot exists, the stale
    /// snapshot is served and the failure logged; the next call retries.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` only when no snapshot has ever been
    /// loaded and the store cannot be reached.
    pub async fn current(&self) -> AuthzResult<Arc<RuleSet>> {
        if self.needs_refresh().await {
            match self.refresh().await {
                Ok(()) => {}
                Err(e) => {
                    let inner = self.inner.read().await;
                    match &inner.snapshot {
                        Some(snapshot) => {
                            tracing::warn!(error = %e, version = inner.version, "ruleset reload failed, serving stale snapshot");
                            return Ok(Arc::clone(snapshot));
                        }
                        None => return Err(e),
                    }
                }
            }
        }

        let inner = self.inner.read().await;
        inner
            .snapshot
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| AuthzError::internal("ruleset cache empty after refresh"))
    }

    /// Reload the snapshot from the store unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when the load fails or exceeds the store
    /// timeout. The prior snapshot is left untouched in that case.
    pub async fn refresh(&self) -> AuthzResult<()> {
        let loaded = tokio::time::timeout(self.store_timeout, self.store.load_all())
            .await
            .map_err(|_| {
                AuthzError::store_unavailable(format!(
                    "policy load exceeded {:?}",
                    self.store_timeout
                ))
            })??;

        let mut inner = self.inner.write().await;
        inner.version += 1;
        let ruleset = Arc::new(RuleSet::build(loaded, inner.version));

        tracing::info!(
            rules = ruleset.len(),
            grants = ruleset.grants().len(),
            groupings = ruleset.groupings().len(),
            version = inner.version,
            "ruleset cache refreshed"
        );

        inner.snapshot = Some(ruleset);
        inner.last_refresh = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Invalidate the cache, forcing a reload on the next access.
    ///
    /// Call this after every successful policy mutation.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.write().await;
        inner.last_refresh = OffsetDateTime::UNIX_EPOCH;
        tracing::debug!(version = inner.version, "ruleset cache invalidated");
    }

    /// Current snapshot version (0 before the first load).
    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }

    /// Whether the next access will trigger a reload.
    pub async fn needs_refresh(&self) -> bool {
        let inner = self.inner.read().await;
        inner.snapshot.is_none() || inner.last_refresh + self.ttl < OffsetDateTime::now_utc()
    }

    /// Cache statistics for the operator surface.
    pub async fn stats(&self) -> RuleSetCacheStats {
        let inner = self.inner.read().await;
        let (rule_count, grant_count, grouping_count) = inner
            .snapshot
            .as_ref()
            .map_or((0, 0, 0), |s| {
                (s.len(), s.grants().len(), s.groupings().len())
            });
        RuleSetCacheStats {
            rule_count,
            grant_count,
            grouping_count,
            version: inner.version,
            last_refresh: inner.last_refresh,
            ttl: self.ttl,
        }
    }
}

/// Statistics about the ruleset cache.
#[derive(Debug, Clone)]
pub struct RuleSetCacheStats {
    /// Total rules in the active snapshot.
    pub rule_count: usize,

    /// Grant rules in the active snapshot.
    pub grant_count: usize,

    /// Grouping rules in the active snapshot.
    pub grouping_count: usize,

    /// Snapshot version, incremented on each successful reload.
    pub version: u64,

    /// Timestamp of the last successful reload.
    pub last_refresh: OffsetDateTime,

    /// Configured TTL.
    pub ttl: Duration,
}

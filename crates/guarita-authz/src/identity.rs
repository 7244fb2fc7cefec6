//! Identity alias resolution.
//!
//! Rules may name a subject either by email or by the opaque `user:{id}`
//! form. When the primary match is inconclusive, the engine retries with the
//! subject's alternate form, resolved through the [`UserDirectory`]. Results
//! are cached with a TTL so a burst of requests for the same subject costs a
//! single directory round trip.
//!
//! Resolution is best-effort: a directory failure or timeout downgrades to a
//! warning and the evaluation continues with the original subject only. Only
//! successful resolutions are cached; failures are retried on the next
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::AuthzResult;
use crate::config::AuthzConfig;

/// Lookup boundary against the user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve an email address to the opaque user id, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLookupFailed` when the directory cannot be queried.
    async fn id_for_email(&self, email: &str) -> AuthzResult<Option<String>>;

    /// Resolve an opaque user id back to its email address, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLookupFailed` when the directory cannot be queried.
    async fn email_for_id(&self, id: &str) -> AuthzResult<Option<String>>;
}

struct AliasEntry {
    alternate: String,
    cached_at: OffsetDateTime,
}

/// Resolves a subject's alternate identity form, with TTL caching.
pub struct IdentityNormalizer {
    directory: Arc<dyn UserDirectory>,
    cache: RwLock<HashMap<String, AliasEntry>>,
    ttl: Duration,
    lookup_timeout: std::time::Duration,
}

impl IdentityNormalizer {
    /// Create a normalizer over the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, config: &AuthzConfig) -> Self {
        Self {
            directory,
            cache: RwLock::new(HashMap::new()),
            ttl: Duration::try_from(config.alias_cache_ttl).unwrap_or(Duration::minutes(5)),
            lookup_timeout: config.directory_timeout,
        }
    }

    /// Resolve the alternate form of a subject.
    ///
    /// A subject containing `@` is treated as an email and resolved to
    /// `user:{id}`; anything else is treated as a user id (with an optional
    /// `user:` prefix) and resolved to the email. Returns `None` when the
    /// directory has no mapping or the lookup fails.
    pub async fn alternate_for(&self, subject: &str) -> Option<String> {
        if let Some(cached) = self.cached(subject).await {
            return Some(cached);
        }

        let resolved = self.lookup(subject).await?;
        let mut cache = self.cache.write().await;
        cache.insert(
            subject.to_string(),
            AliasEntry {
                alternate: resolved.clone(),
                cached_at: OffsetDateTime::now_utc(),
            },
        );
        Some(resolved)
    }

    /// Number of live cache entries.
    pub async fn cached_aliases(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.cache
            .read()
            .await
            .values()
            .filter(|entry| entry.cached_at + self.ttl >= now)
            .count()
    }

    async fn cached(&self, subject: &str) -> Option<String> {
        let cache = self.cache.read().await;
        let entry = cache.get(subject)?;
        if entry.cached_at + self.ttl < OffsetDateTime::now_utc() {
            return None;
        }
        Some(entry.alternate.clone())
    }

    async fn lookup(&self, subject: &str) -> Option<String> {
        let fut = async {
            if subject.contains('@') {
                self.directory
                    .id_for_email(subject)
                    .await
                    .map(|id| id.map(|id| format!("user:{id}")))
            } else {
                let id = subject.strip_prefix("user:").unwrap_or(subject);
                self.directory.email_for_id(id).await
            }
        };

        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(Ok(alternate)) => alternate,
            Ok(Err(e)) => {
                tracing::warn!(subject = %subject, error = %e, "alias resolution failed, continuing without alias");
                None
            }
            Err(_) => {
                tracing::warn!(subject = %subject, timeout = ?self.lookup_timeout, "alias resolution timed out, continuing without alias");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StubDirectory {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubDirectory {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UserDirectory for StubDirectory {
        async fn id_for_email(&self, email: &str) -> AuthzResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthzError::directory_lookup_failed("directory down"));
            }
            Ok((email == "alice@x.com").then(|| "u-1".to_string()))
        }

        async fn email_for_id(&self, id: &str) -> AuthzResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthzError::directory_lookup_failed("directory down"));
            }
            Ok((id == "u-1").then(|| "alice@x.com".to_string()))
        }
    }

    fn normalizer(directory: Arc<StubDirectory>) -> IdentityNormalizer {
        IdentityNormalizer::new(directory, &AuthzConfig::default())
    }

    #[tokio::test]
    async fn email_resolves_to_prefixed_id() {
        let n = normalizer(Arc::new(StubDirectory::new()));
        assert_eq!(
            n.alternate_for("alice@x.com").await,
            Some("user:u-1".to_string())
        );
    }

    #[tokio::test]
    async fn prefixed_id_resolves_to_email() {
        let n = normalizer(Arc::new(StubDirectory::new()));
        assert_eq!(
            n.alternate_for("user:u-1").await,
            Some("alice@x.com".to_string())
        );
    }

    #[tokio::test]
    async fn bare_id_resolves_to_email() {
        let n = normalizer(Arc::new(StubDirectory::new()));
        assert_eq!(
            n.alternate_for("u-1").await,
            Some("alice@x.com".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_subject_resolves_to_none() {
        let n = normalizer(Arc::new(StubDirectory::new()));
        assert_eq!(n.alternate_for("nobody@x.com").await, None);
        assert_eq!(n.alternate_for("user:u-404").await, None);
    }

    #[tokio::test]
    async fn successful_resolutions_are_cached() {
        let directory = Arc::new(StubDirectory::new());
        let n = normalizer(directory.clone());

        let _ = n.alternate_for("alice@x.com").await;
        let _ = n.alternate_for("alice@x.com").await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(n.cached_aliases().await, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let directory = Arc::new(StubDirectory::new());
        directory.fail.store(true, Ordering::SeqCst);
        let n = normalizer(directory.clone());

        assert_eq!(n.alternate_for("alice@x.com").await, None);
        assert_eq!(n.cached_aliases().await, 0);

        // The directory recovers; the next request retries instead of
        // serving a cached miss.
        directory.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            n.alternate_for("alice@x.com").await,
            Some("user:u-1".to_string())
        );
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let directory = Arc::new(StubDirectory::new());
        let config = AuthzConfig {
            alias_cache_ttl: std::time::Duration::ZERO,
            ..AuthzConfig::default()
        };
        let n = IdentityNormalizer::new(directory.clone(), &config);

        let _ = n.alternate_for("alice@x.com").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _ = n.alternate_for("alice@x.com").await;
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }
}

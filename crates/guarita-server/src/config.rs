//! Server configuration.
//!
//! Loaded from a TOML file (path from `GUARITA_CONFIG`, default
//! `guarita.toml`); every section is optional and falls back to defaults.
//! `DATABASE_URL` from the environment overrides the file so deployments can
//! keep credentials out of the config.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! storage = "postgres"
//! database_url = "postgres://localhost/guarita"
//!
//! [authz]
//! cache_ttl = "5m"
//! ```

use std::path::Path;

use guarita_authz::config::AuthzConfig;
use serde::Deserialize;

/// Which policy store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process store, rules seeded at startup. For development and tests.
    Memory,
    /// PostgreSQL-backed store, directory and audit log.
    Postgres,
}

/// Root server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,

    /// Policy store backend.
    pub storage: StorageBackend,

    /// PostgreSQL connection string; required for the `postgres` backend.
    pub database_url: Option<String>,

    /// Engine tunables.
    pub authz: AuthzConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            storage: StorageBackend::Memory,
            database_url: None,
            authz: AuthzConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. `DATABASE_URL` from the environment wins over the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_memory_backend() {
        let config = ServerConfig::default();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            storage = "postgres"
            database_url = "postgres://localhost/guarita"

            [authz]
            cache_ttl = "30s"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(
            config.authz.cache_ttl,
            std::time::Duration::from_secs(30)
        );
        // Unset fields keep their defaults.
        assert_eq!(config.bind, "0.0.0.0:8080");
    }
}

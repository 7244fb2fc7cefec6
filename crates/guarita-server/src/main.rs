use std::path::PathBuf;
use std::sync::Arc;

use guarita_authz::engine::AuthzEngine;
use guarita_authz::storage::MemoryPolicyStore;
use guarita_authz_postgres::{PgAuditSink, PgPolicyStore, PgUserDirectory};
use guarita_server::config::{ServerConfig, StorageBackend};
use guarita_server::routes::{AppState, router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; absence is not an error.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("GUARITA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("guarita.toml"));
    let config = ServerConfig::load(&config_path)?;

    let engine = build_engine(&config).await?;
    let app = router(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "authorization service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_engine(config: &ServerConfig) -> anyhow::Result<Arc<AuthzEngine>> {
    let engine = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("running with the in-memory policy store, rules are not persisted");
            AuthzEngine::new(Arc::new(MemoryPolicyStore::new()), &config.authz)
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("postgres backend requires database_url"))?;
            let pool = guarita_authz_postgres::connect(url).await?;
            tracing::info!("connected to PostgreSQL policy store");
            AuthzEngine::new(Arc::new(PgPolicyStore::new(pool.clone())), &config.authz)
                .with_directory(Arc::new(PgUserDirectory::new(pool.clone())), &config.authz)
                .with_audit_sink(Arc::new(PgAuditSink::new(pool)), &config.authz)
        }
    };
    Ok(Arc::new(engine))
}

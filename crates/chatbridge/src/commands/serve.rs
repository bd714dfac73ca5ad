//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use chatbridge::client::{ClientFactory, SubprocessClientFactory};
use chatbridge::config::{self, Config};
use chatbridge::manager::SessionManager;
use chatbridge::pairing::{DataUrlRenderer, PairingRenderer};
use chatbridge::server::{self, AppState};
use chatbridge::session::SessionRegistry;
use chatbridge::store::{HistoryStore, SqliteHistoryStore};

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path).await?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let config_path_ref = Path::new(config_path);

    // Audit store first: a gateway that cannot audit must not come up.
    let db_path = config
        .database
        .path
        .as_ref()
        .map(|p| config::resolve_path(config_path_ref, p))
        .unwrap_or_else(|| {
            config::resolve_path(config_path_ref, Path::new(config::DEFAULT_DATABASE_PATH))
        });
    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::open(&db_path)
            .with_context(|| format!("failed to initialize audit store at {}", db_path.display()))?,
    );
    info!(path = %db_path.display(), "audit store ready");

    // Driver factory and session registry
    let profile_root = config
        .driver
        .profile_dir
        .as_ref()
        .map(|p| config::resolve_path(config_path_ref, p))
        .unwrap_or_else(|| {
            config::resolve_path(config_path_ref, Path::new(config::DEFAULT_PROFILE_DIR))
        });
    let factory: Arc<dyn ClientFactory> = Arc::new(SubprocessClientFactory::new(
        config.driver.clone(),
        profile_root,
    ));
    let renderer: Arc<dyn PairingRenderer> = Arc::new(DataUrlRenderer);
    let registry = SessionRegistry::new(factory, renderer, history.clone());

    let manager = SessionManager::new(
        registry.clone(),
        history,
        Duration::from_millis(config.dispatch.min_interval_ms),
    );

    let app = server::build_app(
        AppState { manager },
        config.server.request_timeout_seconds,
        config.server.max_connections,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "chatbridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}

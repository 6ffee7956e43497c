//! ==============================================================================
//! main.rs - registros host entry point
//! ==============================================================================
//!
//! purpose:
//!     the small backend behind the sensor dashboard. devices POST readings,
//!     the dashboard lists devices, reads a device's latest readings, exports
//!     everything as json or wipes the table.
//!
//! responsibilities:
//!     - read the mandatory environment (ENV, DSN) and host.toml
//!     - set up logging for the selected mode
//!     - open the sqlite store once and inject it into the router
//!     - serve the api until ctrl-c / sigterm, then drop the store
//!
//! relationships:
//!     - uses: config.rs (HostConfig, Environment)
//!     - uses: storage.rs (SqliteStore)
//!     - uses: server.rs (router)
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                  │
//!     │   device ──POST──┐                     ┌──GET── dashboard │
//!     │                  ▼                     │                  │
//!     │            ┌──────────┐   rows   ┌───────────┐            │
//!     │            │  server  │ ───────▶ │ aggregate │            │
//!     │            └────┬─────┘          └───────────┘            │
//!     │                 │ (Arc<dyn ReadingStore>)                 │
//!     │            ┌────┴─────┐                                   │
//!     │            │  sqlite  │  Registros 1───* Datos            │
//!     │            └──────────┘                                   │
//!     └──────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use registros_host::{
    config::{self, Environment, HostConfig},
    server::{self, AppState},
    storage::SqliteStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: mandatory environment - missing ENV or DSN stops us here.
    // a missing .env is fine as long as the process env has both.
    let dotenv = config::load_dotenv();
    let env = Environment::from_env().context("missing required configuration")?;

    // step 2: logging, strictness picked by ENV
    init_tracing(&env);
    match dotenv {
        Ok(path) => tracing::info!("[STARTUP] Loaded {}", path.display()),
        Err(e) => tracing::warn!("[STARTUP] {:#}", e),
    }
    if env.mode_is_unknown() {
        tracing::warn!("[STARTUP] ENV={:?} is neither release nor debug, using debug", env.mode_raw);
    }

    tracing::info!("===========================================================");
    tracing::info!("  Registros Host");
    tracing::info!("===========================================================");

    // step 3: host.toml (optional) + env overrides
    let mut config = HostConfig::load_or_default();
    config.apply_env(&env);
    config.print_summary(&env);
    let offset = config.utc_offset_minutes()?;

    // step 4: storage, opened once and handed to every handler
    let store = SqliteStore::open(&env.dsn, offset)
        .with_context(|| format!("failed to open storage at {:?}", env.dsn))?;
    tracing::info!("[STARTUP] ✓ Storage ready");

    // step 5: serve until shutdown
    let addr = config.server.listen_addr.clone();
    let app = server::router(AppState::new(Arc::new(store), config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("[STARTUP] ✓ API live at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    tracing::info!("[SHUTDOWN] server stopped, storage closed");
    Ok(())
}

fn init_tracing(env: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env.mode.default_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// resolves on ctrl-c, or sigterm on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[SHUTDOWN] ctrl-c handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("[SHUTDOWN] sigterm handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("[SHUTDOWN] signal received, draining requests");
}

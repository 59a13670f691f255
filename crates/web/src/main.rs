//! `web`: server-rendered channel application.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise logging (and OTLP export when configured).
//! 3. Open the SQLite database.
//! 4. Build the session and identity stores.
//! 5. Spawn the expired-session sweeper.
//! 6. Load the view templates.
//! 7. Build the request pipeline and serve until SIGTERM or Ctrl-C.

mod assets;
mod config;
mod db;
mod identity;
mod server;
mod session;
mod telemetry;
mod views;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use assets::StaticAssets;
use config::Config;
use db::Database;
use identity::SqliteIdentityStore;
use server::{routes::RouteGroups, state::AppState};
use session::{CookieSettings, CookieSigner, SessionManager, SessionStore, SqliteSessionStore};
use views::Views;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Logging is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;
    let environment = cfg.environment();

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(
        environment,
        &cfg.log_level,
        cfg.otel_exporter_otlp_endpoint.as_deref(),
    )?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        environment = ?environment,
        "web starting"
    );

    // -----------------------------------------------------------------------
    // 3. Database
    // -----------------------------------------------------------------------
    let db = Database::open(&cfg.database_path)
        .with_context(|| format!("failed to open database at {}", cfg.database_path))?;

    // -----------------------------------------------------------------------
    // 4. Stores
    // -----------------------------------------------------------------------
    let session_store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(db.clone()));
    let identities = Arc::new(SqliteIdentityStore::new(db));
    let signer = CookieSigner::new(&cfg.session_secret)
        .map_err(|_| anyhow::anyhow!("SESSION_SECRET is not a usable signing key"))?;
    let sessions = SessionManager::new(
        Arc::clone(&session_store),
        signer,
        CookieSettings {
            name: cfg.session_cookie_name.clone(),
            max_age: cfg.session_max_age(),
            secure: cfg.session_cookie_secure,
        },
        cfg.session_store_ttl(),
    );

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _session_prune = session::prune_task(session_store, cfg.session_prune_interval());

    // -----------------------------------------------------------------------
    // 6. Views
    // -----------------------------------------------------------------------
    let views = Views::from_dir(&cfg.views_dir, environment)?;

    // -----------------------------------------------------------------------
    // 7. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(
        sessions,
        identities,
        views,
        environment,
        StaticAssets::new(&cfg.public_dir, &cfg.favicon_path, environment),
        cfg.request_timeout(),
    );
    let router = server::router::build(state, RouteGroups::default());

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("web stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C. A signal handler that cannot be installed
/// leaves the other one in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
    info!("shutdown signal received");
}

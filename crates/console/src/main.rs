mod client;
mod commands;
mod config;
mod error;
#[cfg(test)]
mod fake;
mod hysteresis;
mod model;
mod store;
mod sync;
mod validate;
mod web;

use anyhow::{Context, Result};
use std::{env, sync::Arc};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use client::HttpAuthority;
use commands::Controller;
use model::ControlConfig;
use store::ControlStateStore;
use sync::SyncLoop;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "console.toml".to_string());
    let cfg = config::load(&config_path)?;

    // ── Control authority ───────────────────────────────────────────
    let authority = Arc::new(
        HttpAuthority::new(&cfg.backend_url, cfg.request_timeout())
            .context("failed to build http client")?,
    );

    // ── Session store ───────────────────────────────────────────────
    // Defaults stand in until the first poll reports the real configuration.
    let store = ControlStateStore::new(ControlConfig::default());
    store.record_system("console started".to_string()).await;

    let controller = Controller::new(authority, store.clone());

    // Log freshness transitions as they happen.
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        let mut was_stale = changes.borrow().stale;
        while changes.changed().await.is_ok() {
            let st = changes.borrow_and_update().clone();
            if st.stale != was_stale {
                if st.stale {
                    warn!(failures = st.consecutive_failures, "remote state is stale");
                } else {
                    info!("remote state fresh again");
                }
                was_stale = st.stale;
            }
        }
    });

    // ── Sync loop ───────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_loop = SyncLoop::new(controller.clone(), cfg.poll_interval());
    let sync_handle = tokio::spawn(sync_loop.run(shutdown_rx));

    // ── Local API ───────────────────────────────────────────────────
    let web_state = AppState {
        controller,
        history_limit: cfg.history_limit,
    };
    let web_port = cfg.web_port;
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, web_port).await {
            error!("local api stopped: {e:#}");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    web_handle.abort();
    if let Err(e) = sync_handle.await {
        error!("sync loop task failed: {e}");
    }

    let last = store.read().await;
    info!(
        stale = last.stale,
        pump = ?last.config.pump_status,
        "console stopped"
    );
    Ok(())
}

//! POO Interactif · Course Backend
//!
//! - Axum HTTP + WebSocket API
//! - Tiered micro-challenge validation with badges and feedback
//! - File-backed session progress with periodic autosave
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT          : u16 (default 4000)
//!   COURSE_CONFIG_PATH  : path to TOML config (levels/challenges/badges overlay)
//!   COURSE_DATA_DIR  : progress store directory (default "./data")
//!   COURSE_SAVE_INTERVAL_SECS : autosave period in seconds (default 30)
//!   STATIC_DIR    : static frontend directory (default "./static")
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod catalog;
mod feedback;
mod validator;
mod session;
mod store;
mod state;
mod protocol;
mod logic;
mod errors;
mod routes;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

const DEFAULT_SAVE_INTERVAL_SECS: u64 = 30;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (catalog, sessions, progress store).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Periodically flush live sessions to the store.
  let save_interval = std::env::var("COURSE_SAVE_INTERVAL_SECS")
    .ok()
    .and_then(|v| v.parse::<u64>().ok())
    .filter(|secs| *secs > 0)
    .unwrap_or(DEFAULT_SAVE_INTERVAL_SECS);
  let autosave_state = state.clone();
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(Duration::from_secs(save_interval));
    // The first tick completes immediately; skip it.
    ticker.tick().await;
    loop {
      ticker.tick().await;
      let saved = autosave_state.save_all().await;
      if saved > 0 {
        debug!(target: "poo_backend", saved, "Autosave pass");
      }
    }
  });
  info!(target: "poo_backend", interval_secs = save_interval, "Autosave enabled");

  // Read port from env or default to 4000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 4000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "poo_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal(state.clone()))
    .await?;

  // Final flush once the server loop has drained.
  let saved = state.save_all().await;
  info!(target: "poo_backend", saved, "Server stopped");
  Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "poo_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  let saved = state.save_all().await;
  info!(target: "poo_backend", saved, "Shutdown signal received, progress saved");
}

//! Parsons Forge · Adaptive Parsons Puzzle Backend
//!
//! - Axum HTTP API for puzzle generation, submission and learner skill
//! - OpenRouter (OpenAI-compatible) model integration via environment variables
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   OPENROUTER_API_KEY     : required for generation
//!   OPENROUTER_BASE_URL    : default "https://openrouter.ai/api/v1"
//!   OPENROUTER_MODEL       : default "anthropic/claude-3.5-sonnet"
//!   OPENROUTER_REFERRER    : HTTP-Referer header (default "http://localhost:3000")
//!   OPENROUTER_TITLE       : X-Title header (default "Adaptive Parsons")
//!   LLM_TIMEOUT_SECS       : per-attempt timeout (default 60)
//!   LLM_MAX_ATTEMPTS       : attempts per call (default 3)
//!   LLM_INITIAL_BACKOFF_MS : first backoff, doubled per retry (default 1000)
//!   AGENT_CONFIG_PATH      : path to TOML config ([model], [prompts])
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use parsons_forge::routes::build_router;
use parsons_forge::state::AppState;
use parsons_forge::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (in-memory stores, model client, prompts).
  let state = Arc::new(AppState::new());

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "parsons_forge", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "parsons_forge", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "parsons_forge", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}

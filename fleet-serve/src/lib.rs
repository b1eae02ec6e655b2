//! Control API for the fleet runtime (§6): a plain JSON REST surface over
//! axum, reading and commanding a running set of agents without ever
//! touching an `Agent` task directly — state flows out through
//! [`fleet_core::AgentRegistry`] and [`fleet_core::MemoryStore`], commands
//! flow in as events enqueued onto the [`fleet_core::EventEngine`].

mod app;
mod error;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use app::AppState;
pub use error::ApiError;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the Control API on an existing listener. Used directly by tests
/// (bind to `127.0.0.1:0`, pass the listener, read back the assigned port).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("control API listening on http://{}", addr);
    let router = app::router(state);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Runs the Control API, binding `addr` (default `127.0.0.1:8080`).
pub async fn run_serve(
    addr: Option<&str>,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}

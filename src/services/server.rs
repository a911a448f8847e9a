//! HTTP server for the reviewer assignment API.
//!
//! Builds the axum router over shared [`AppState`] and serves it until the
//! cancellation token fires.

use crate::db::SqliteStore;
use crate::services::api::api_routes;
use crate::services::assignment::AssignmentEngine;
use axum::Router;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Assignment engine wired to the SQLite directory and ledger.
pub type Engine = AssignmentEngine<SqliteStore, SqliteStore, StdRng>;

/// Shared state for the axum routes.
#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub engine: Arc<Engine>,
}

impl AppState {
    /// One engine per process; `rng` is its only randomness source.
    pub fn new(store: SqliteStore, rng: StdRng) -> Self {
        let engine = AssignmentEngine::new(store.clone(), store.clone(), rng);
        Self {
            store,
            engine: Arc::new(engine),
        }
    }
}

/// Build the full router with state attached.
pub fn router(state: AppState) -> Router {
    api_routes().with_state(state)
}

/// Serve `app` on `listener` until `cancel_token` is cancelled.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("[server] Listening on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            log::info!("[server] Shutdown requested");
        })
        .await?;

    log::info!("[server] Server stopped");
    Ok(())
}

pub mod arbitrator;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use state::ServerState;

/// Builds the RPC router against a shared server state. Split out of
/// `main` so integration tests can mount the whole app in-process instead
/// of needing a separately running server.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/rpc/getattr", post(handlers::getattr))
        .route("/rpc/mknod", post(handlers::mknod))
        .route("/rpc/open", post(handlers::open))
        .route("/rpc/release", post(handlers::release))
        .route("/rpc/read", post(handlers::read))
        .route("/rpc/write", post(handlers::write))
        .route("/rpc/truncate", post(handlers::truncate))
        .route("/rpc/fsync", post(handlers::fsync))
        .route("/rpc/utimens", post(handlers::utimens))
        .route("/rpc/lock", post(handlers::lock_path))
        .route("/rpc/unlock", post(handlers::unlock_path))
        .with_state(state)
}

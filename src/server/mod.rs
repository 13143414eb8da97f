//! Tier1 HTTP surface: heartbeat ingestion, cloudlet listing and matching

pub mod handlers;
pub mod state;

pub use handlers::{create_router, ApiError, MatchRequest, CLIENT_IP_HEADER};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

/// Serve the Tier1 API on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET  /health             - Health check");
    info!("  GET  /api/v1/cloudlets/  - Known cloudlets");
    info!("  POST /api/v1/cloudlets/  - Cloudlet heartbeat");
    info!("  GET  /api/v1/matchers    - Configured pipelines");
    info!("  POST /api/v1/match       - Rank cloudlets for a client");

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

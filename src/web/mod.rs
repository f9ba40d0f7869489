//! # Web API Module
//!
//! Axum HTTP layer over the order query service.
//!
//! - `GET /order/{order_uid}`: order JSON with `X-Cache: HIT|MISS`, 404 when absent
//! - `GET /order/`: 400, no id given
//! - `GET /healthz`: `ok`

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

use std::future::IntoFuture;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Build the router with all routes and middleware
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::order_routes())
        .merge(routes::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve `app` until `shutdown` fires, then give in-flight requests up to
/// `shutdown_timeout` to finish
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "🌐 HTTP server listening");
    }

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => {
            info!("HTTP server stopped");
            result
        }
        Err(_) => {
            warn!(
                timeout_ms = shutdown_timeout.as_millis() as u64,
                "HTTP server did not drain in time, dropping open connections"
            );
            Ok(())
        }
    }
}

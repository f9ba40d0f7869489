//! # Web API Route Definitions

use axum::routing::get;
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

/// Order lookup routes
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/order/{order_uid}", get(handlers::orders::get_order))
        .route("/order/", get(handlers::orders::missing_order_id))
        .route("/order", get(handlers::orders::missing_order_id))
}

/// Liveness probe
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(handlers::health::healthz))
}

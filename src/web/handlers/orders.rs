//! # Order Handlers

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use crate::services::OrderLookup;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Response header naming where the order was served from
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Fetch one order: GET /order/{order_uid}
///
/// Responds with the order as JSON and an `X-Cache: HIT|MISS` header, or 404
/// when no such order is stored.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> ApiResult<Response> {
    let order_uid = order_uid.trim();
    if order_uid.is_empty() {
        return Err(ApiError::missing_order_id());
    }

    match state.query.read(order_uid).await? {
        OrderLookup::Found { order, cache } => {
            debug!(order_uid, cache = cache.as_header_value(), "Order served");
            Ok((
                [(CACHE_STATUS_HEADER, cache.as_header_value())],
                Json(order),
            )
                .into_response())
        }
        OrderLookup::NotFound => Err(ApiError::NotFound),
    }
}

/// GET /order/ with no id
pub async fn missing_order_id() -> ApiError {
    ApiError::missing_order_id()
}

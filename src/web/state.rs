//! # Web API Application State

use crate::services::OrderQueryService;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub query: OrderQueryService,
}

impl AppState {
    pub fn new(query: OrderQueryService) -> Self {
        Self { query }
    }
}

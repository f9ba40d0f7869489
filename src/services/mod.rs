//! # Services
//!
//! Read-side composition over the cache and the repository, shared by the
//! HTTP layer and the startup warm-up.

pub mod order_query;

pub use order_query::{CacheStatus, OrderLookup, OrderQueryService, QueryError};

//! # Order Query Service
//!
//! Read-through lookup: cache first, then the repository. A repository hit is
//! written back to the cache so the next read of the same id is served from
//! memory. Repository errors are returned without touching the cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::cache::OrderCache;
use crate::models::Order;
use crate::repository::{OrderRepository, RepositoryError};

/// Where a found order was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    Found { order: Order, cache: CacheStatus },
    NotFound,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Order lookup failed: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct OrderQueryService {
    cache: Arc<OrderCache>,
    repository: Arc<dyn OrderRepository>,
}

impl OrderQueryService {
    pub fn new(cache: Arc<OrderCache>, repository: Arc<dyn OrderRepository>) -> Self {
        Self { cache, repository }
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    #[instrument(skip(self))]
    pub async fn read(&self, order_uid: &str) -> Result<OrderLookup, QueryError> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!("Order served from cache");
            return Ok(OrderLookup::Found {
                order,
                cache: CacheStatus::Hit,
            });
        }

        let stored = self.repository.get_order(order_uid).await.map_err(|e| {
            error!(error = %e, "Order lookup failed");
            e
        })?;

        match stored {
            Some(order) => {
                self.cache.set(order_uid, order.clone());
                debug!("Order loaded from repository and cached");
                Ok(OrderLookup::Found {
                    order,
                    cache: CacheStatus::Miss,
                })
            }
            None => Ok(OrderLookup::NotFound),
        }
    }

    /// Load every stored order into the cache, returning how many were loaded
    #[instrument(skip(self))]
    pub async fn warm_cache(&self) -> Result<usize, QueryError> {
        let orders = self.repository.load_all_orders().await?;
        let count = orders.len();
        for order in orders {
            self.cache.set(order.order_uid.clone(), order);
        }
        Ok(count)
    }
}

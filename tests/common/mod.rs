//! Shared builders for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use order_stream::{
    Delivery, InMemoryOrderLog, InMemoryOrderRepository, IngestionPipeline, Item, Order,
    OrderCache, Payment, PipelineConfig,
};

/// Current time truncated to whole seconds, as it survives a trip through the store
pub fn now_seconds() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
}

pub fn item(chrt_id: i64) -> Item {
    Item {
        chrt_id,
        track_number: "WBILMTESTTRACK".to_string(),
        price: 453,
        rid: format!("ab4219087a764ae0b{chrt_id}"),
        name: "Mascaras".to_string(),
        sale: 30,
        size: "0".to_string(),
        total_price: 317,
        nm_id: 2389212,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}

/// Order that passes every validation rule
pub fn valid_order(order_uid: &str) -> Order {
    let created = now_seconds() - chrono::Duration::minutes(30);
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: created.timestamp(),
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![item(9934930)],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: created,
        oof_shard: "1".to_string(),
    }
}

/// In-memory log, repository and cache wired into a pipeline
pub struct PipelineHarness {
    pub log: Arc<InMemoryOrderLog>,
    pub repository: Arc<InMemoryOrderRepository>,
    pub cache: Arc<OrderCache>,
    pub pipeline: Arc<IngestionPipeline>,
}

pub fn pipeline_harness(cache_ttl: Duration) -> PipelineHarness {
    let log = Arc::new(InMemoryOrderLog::new());
    let repository = Arc::new(InMemoryOrderRepository::new());
    let cache = Arc::new(OrderCache::new(cache_ttl, 1000));
    let pipeline = Arc::new(IngestionPipeline::new(
        log.clone(),
        repository.clone(),
        cache.clone(),
        PipelineConfig {
            fetch_backoff: Duration::from_millis(1),
            persist_retry_backoff: Duration::from_millis(1),
        },
    ));
    PipelineHarness {
        log,
        repository,
        cache,
        pipeline,
    }
}

/// Wait until `condition` holds, failing the test after two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within two seconds"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

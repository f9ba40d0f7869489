//! Order builders for unit tests.

use chrono::{DateTime, Duration, Utc};

use super::{Delivery, Item, Order, Payment};

/// Current time truncated to whole seconds, as it survives a trip through the store
pub(crate) fn now_seconds() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default()
}

pub(crate) fn item(chrt_id: i64) -> Item {
    Item {
        chrt_id,
        track_number: "WBILMTESTTRACK".to_string(),
        price: 453,
        rid: format!("rid-{chrt_id}"),
        name: "Mascaras".to_string(),
        sale: 30,
        size: "0".to_string(),
        total_price: 317,
        nm_id: 2389212,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}

/// Smallest order that passes every validation rule
pub(crate) fn valid_order(order_uid: &str) -> Order {
    let created = now_seconds() - Duration::hours(1);
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

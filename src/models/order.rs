use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Order aggregate root: the header plus its delivery, payment and items.
///
/// The serde field names are the wire contract of messages on the order queue
/// and of the JSON served by the read API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub order_uid: String,
    #[serde(default)]
    pub track_number: String,
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default, rename = "shardkey")]
    pub shard_key: String,
    #[serde(default)]
    pub sm_id: i32,
    #[serde(default)]
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
}

/// Delivery details, exactly one per order.
/// Maps to the `deliveries` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub email: String,
}

/// Payment details, exactly one per order.
///
/// Amounts are in currency minor units. `payment_dt` is Unix seconds on the
/// wire and a `TIMESTAMPTZ` in the `payments` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub payment_dt: i64,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub delivery_cost: i64,
    #[serde(default)]
    pub goods_total: i64,
    #[serde(default)]
    pub custom_fee: i64,
}

/// Line item, keyed by `(order_uid, chrt_id)` in the `items` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Item {
    #[serde(default)]
    pub chrt_id: i64,
    #[serde(default)]
    pub track_number: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sale: i32,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub total_price: i64,
    #[serde(default)]
    pub nm_id: i64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub status: i32,
}

impl Order {
    /// Items ordered by `chrt_id`, the order they are read back from the store in.
    ///
    /// The item collection is a set keyed by `chrt_id`; comparing two
    /// aggregates field-for-field should go through this.
    pub fn sort_items(&mut self) {
        self.items.sort_by_key(|item| item.chrt_id);
    }

    /// Copy of the aggregate as the store gives it back: items in canonical
    /// order, `date_created` cut to the microsecond precision of TIMESTAMPTZ
    pub fn normalized(&self) -> Order {
        let mut order = self.clone();
        order.sort_items();
        order.date_created = order.date_created.trunc_subsecs(6);
        order
    }

    /// Payment timestamp as a UTC datetime, `None` when outside chrono's range
    pub fn payment_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.payment.payment_dt, 0)
    }
}

//! PostgreSQL-backed order repository

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument};

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::models::{Delivery, Item, Order, Payment};

/// Items per multi-row INSERT; keeps each statement well under the
/// PostgreSQL bind parameter limit.
const ITEM_INSERT_CHUNK: usize = 1000;

const UPSERT_ORDER_SQL: &str = r#"
    INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature, customer_id,
                        delivery_service, shardkey, sm_id, date_created, oof_shard)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        customer_id = EXCLUDED.customer_id,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard
"#;

const UPSERT_DELIVERY_SQL: &str = r#"
    INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (order_uid) DO UPDATE SET
        name = EXCLUDED.name,
        phone = EXCLUDED.phone,
        zip = EXCLUDED.zip,
        city = EXCLUDED.city,
        address = EXCLUDED.address,
        region = EXCLUDED.region,
        email = EXCLUDED.email
"#;

const UPSERT_PAYMENT_SQL: &str = r#"
    INSERT INTO payments (order_uid, transaction, request_id, currency, provider, amount,
                          payment_dt, bank, delivery_cost, goods_total, custom_fee)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        transaction = EXCLUDED.transaction,
        request_id = EXCLUDED.request_id,
        currency = EXCLUDED.currency,
        provider = EXCLUDED.provider,
        amount = EXCLUDED.amount,
        payment_dt = EXCLUDED.payment_dt,
        bank = EXCLUDED.bank,
        delivery_cost = EXCLUDED.delivery_cost,
        goods_total = EXCLUDED.goods_total,
        custom_fee = EXCLUDED.custom_fee
"#;

const SELECT_ORDER_HEADERS_SQL: &str = r#"
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature, o.customer_id,
           o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
           d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
           p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt, p.bank,
           p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN deliveries d ON d.order_uid = o.order_uid
    JOIN payments p ON p.order_uid = o.order_uid
"#;

const SELECT_ITEM_COLUMNS: &str = r#"
    SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size, total_price,
           nm_id, brand, status
    FROM items
"#;

/// Joined header + delivery + payment row
#[derive(Debug, FromRow)]
struct OrderHeaderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    delivery_name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: DateTime<Utc>,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

impl OrderHeaderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.phone,
                zip: self.zip,
                city: self.city,
                address: self.address,
                region: self.region,
                email: self.email,
            },
            payment: Payment {
                transaction: self.transaction,
                request_id: self.request_id,
                currency: self.currency,
                provider: self.provider,
                amount: self.amount,
                payment_dt: self.payment_dt.timestamp(),
                bank: self.bank,
                delivery_cost: self.delivery_cost,
                goods_total: self.goods_total,
                custom_fee: self.custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shard_key: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

/// Item row carrying its owning order id, for bulk loads
#[derive(Debug, FromRow)]
struct OwnedItemRow {
    order_uid: String,
    #[sqlx(flatten)]
    item: Item,
}

/// Order repository over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read-only snapshot transaction so the header and item reads agree
    /// even while a concurrent upsert commits between them.
    async fn begin_snapshot(&self) -> RepositoryResult<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RepositoryError::database("begin read transaction"))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::database("set read isolation"))?;
        Ok(tx)
    }

    async fn insert_items(
        tx: &mut Transaction<'static, Postgres>,
        order: &Order,
    ) -> RepositoryResult<()> {
        for chunk in order.items.chunks(ITEM_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(order.order_uid.clone())
                    .push_bind(item.chrt_id)
                    .push_bind(item.track_number.clone())
                    .push_bind(item.price)
                    .push_bind(item.rid.clone())
                    .push_bind(item.name.clone())
                    .push_bind(item.sale)
                    .push_bind(item.size.clone())
                    .push_bind(item.total_price)
                    .push_bind(item.nm_id)
                    .push_bind(item.brand.clone())
                    .push_bind(item.status);
            });
            builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(RepositoryError::database("insert items"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid, items = order.items.len()))]
    async fn upsert_order(&self, order: &Order) -> RepositoryResult<()> {
        let payment_time =
            order
                .payment_time()
                .ok_or_else(|| RepositoryError::InvalidAggregate {
                    order_uid: order.order_uid.clone(),
                    reason: format!("payment_dt {} is not a valid timestamp", order.payment.payment_dt),
                })?;

        // Dropping the transaction without commit rolls everything back
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RepositoryError::database("begin transaction"))?;

        sqlx::query(UPSERT_ORDER_SQL)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shard_key)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::database("upsert order header"))?;

        let delivery = &order.delivery;
        sqlx::query(UPSERT_DELIVERY_SQL)
            .bind(&order.order_uid)
            .bind(&delivery.name)
            .bind(&delivery.phone)
            .bind(&delivery.zip)
            .bind(&delivery.city)
            .bind(&delivery.address)
            .bind(&delivery.region)
            .bind(&delivery.email)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::database("upsert delivery"))?;

        let payment = &order.payment;
        sqlx::query(UPSERT_PAYMENT_SQL)
            .bind(&order.order_uid)
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment_time)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::database("upsert payment"))?;

        let removed = sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::database("delete items"))?
            .rows_affected();

        Self::insert_items(&mut tx, order).await?;

        tx.commit()
            .await
            .map_err(RepositoryError::database("commit transaction"))?;

        debug!(
            replaced_items = removed,
            inserted_items = order.items.len(),
            "Order upserted"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_uid: &str) -> RepositoryResult<Option<Order>> {
        let mut tx = self.begin_snapshot().await?;

        let header_sql = format!("{SELECT_ORDER_HEADERS_SQL} WHERE o.order_uid = $1");
        let header = sqlx::query_as::<_, OrderHeaderRow>(&header_sql)
            .bind(order_uid)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::database("select order"))?;

        let Some(header) = header else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY chrt_id
            "#,
        )
        .bind(order_uid)
        .fetch_all(&mut *tx)
        .await
        .map_err(RepositoryError::database("select items"))?;

        tx.commit()
            .await
            .map_err(RepositoryError::database("end read transaction"))?;

        Ok(Some(header.into_order(items)))
    }

    #[instrument(skip(self))]
    async fn load_all_orders(&self) -> RepositoryResult<Vec<Order>> {
        let mut tx = self.begin_snapshot().await?;

        let header_sql = format!("{SELECT_ORDER_HEADERS_SQL} ORDER BY o.order_uid");
        let headers = sqlx::query_as::<_, OrderHeaderRow>(&header_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(RepositoryError::database("select all orders"))?;

        let items_sql = format!("{SELECT_ITEM_COLUMNS} ORDER BY order_uid, chrt_id");
        let item_rows = sqlx::query_as::<_, OwnedItemRow>(&items_sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(RepositoryError::database("select all items"))?;

        tx.commit()
            .await
            .map_err(RepositoryError::database("end read transaction"))?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in item_rows {
            items_by_order.entry(row.order_uid).or_default().push(row.item);
        }

        let orders: Vec<Order> = headers
            .into_iter()
            .map(|header| {
                let items = items_by_order
                    .remove(&header.order_uid)
                    .unwrap_or_default();
                header.into_order(items)
            })
            .collect();

        debug!(count = orders.len(), "Loaded all orders");
        Ok(orders)
    }
}

//! # PostgreSQL Repository Tests
//!
//! Run with `cargo test --features db-tests` and `DATABASE_URL` pointing at a
//! server where test databases can be created.
#![cfg(feature = "db-tests")]

mod common;

use order_stream::repository::RepositoryError;
use order_stream::{OrderRepository, PgOrderRepository};
use sqlx::PgPool;

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_upsert_then_get_round_trips(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    let mut order = common::valid_order("b563feb7b2b84b6test");
    order.items = vec![common::item(30), common::item(10), common::item(20)];
    order.payment.custom_fee = 12;
    order.internal_signature = "sig".to_string();

    repo.upsert_order(&order).await.unwrap();
    let stored = repo.get_order(&order.order_uid).await.unwrap().unwrap();

    assert_eq!(stored, order.normalized());
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_repeated_upsert_replaces_item_set(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool.clone());
    let mut order = common::valid_order("order-replace-1");
    order.items = vec![common::item(1), common::item(2), common::item(3)];

    repo.upsert_order(&order).await.unwrap();
    repo.upsert_order(&order).await.unwrap();

    order.items = vec![common::item(2), common::item(4)];
    order.delivery.city = "Haifa".to_string();
    repo.upsert_order(&order).await.unwrap();

    let stored = repo.get_order("order-replace-1").await.unwrap().unwrap();
    let chrt_ids: Vec<i64> = stored.items.iter().map(|i| i.chrt_id).collect();
    assert_eq!(chrt_ids, vec![2, 4]);
    assert_eq!(stored.delivery.city, "Haifa");

    let (item_rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM items WHERE order_uid = $1")
            .bind("order-replace-1")
            .fetch_one(&pool)
            .await?;
    assert_eq!(item_rows, 2);
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_unknown_order_is_none(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    assert!(repo.get_order("order-missing").await.unwrap().is_none());
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_failed_upsert_leaves_previous_aggregate(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    let order = common::valid_order("order-atomic-1");
    repo.upsert_order(&order).await.unwrap();

    // duplicate chrt_id breaks the items key after header, delivery and
    // payment were already rewritten inside the transaction
    let mut broken = order.clone();
    broken.delivery.city = "Nowhere".to_string();
    broken.items = vec![common::item(7), common::item(7)];
    let result = repo.upsert_order(&broken).await;
    assert!(matches!(result, Err(RepositoryError::Database { .. })));

    let stored = repo.get_order("order-atomic-1").await.unwrap().unwrap();
    assert_eq!(stored, order.normalized());
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_out_of_range_payment_time_is_rejected(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    let mut order = common::valid_order("order-badtime-1");
    order.payment.payment_dt = i64::MAX;

    assert!(matches!(
        repo.upsert_order(&order).await,
        Err(RepositoryError::InvalidAggregate { .. })
    ));
    assert!(repo.get_order("order-badtime-1").await.unwrap().is_none());
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_load_all_returns_every_aggregate(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    assert!(repo.load_all_orders().await.unwrap().is_empty());

    let mut first = common::valid_order("order-all-0001");
    first.items = vec![common::item(5), common::item(4)];
    let second = common::valid_order("order-all-0002");
    repo.upsert_order(&second).await.unwrap();
    repo.upsert_order(&first).await.unwrap();

    let all = repo.load_all_orders().await.unwrap();
    assert_eq!(all, vec![first.normalized(), second.normalized()]);
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_deleting_header_cascades(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool.clone());
    repo.upsert_order(&common::valid_order("order-cascade-1"))
        .await
        .unwrap();

    sqlx::query("DELETE FROM orders WHERE order_uid = $1")
        .bind("order-cascade-1")
        .execute(&pool)
        .await?;

    for table in ["deliveries", "payments", "items"] {
        let (rows,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE order_uid = $1"
        ))
        .bind("order-cascade-1")
        .fetch_one(&pool)
        .await?;
        assert_eq!(rows, 0, "{table}");
    }
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_database_connection_health_check(pool: PgPool) -> sqlx::Result<()> {
    let database = order_stream::database::DatabaseConnection::from_pool(pool);
    assert!(database.health_check().await?);
    database.close().await;
    Ok(())
}

#[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
async fn test_sub_microsecond_created_time_matches_normalized(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgOrderRepository::new(pool);
    let mut order = common::valid_order("order-precise-db");
    order.date_created += chrono::Duration::nanoseconds(123_456_789);

    repo.upsert_order(&order).await.unwrap();
    let stored = repo.get_order("order-precise-db").await.unwrap().unwrap();

    assert_ne!(stored, order);
    assert_eq!(stored, order.normalized());
    Ok(())
}

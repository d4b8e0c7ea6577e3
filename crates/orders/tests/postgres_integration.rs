//! PostgreSQL integration tests for the order ledger.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Address, Currency, Money, OrderId, PageRequest, UserId};
use orders::{
    NewOrder, NewOrderItem, OrderError, OrderLedger, OrderLookup, OrderStatus,
    PostgresOrderLedger, StatusUpdate, TransitionPolicy,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderLedger::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_ledger() -> PostgresOrderLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_status_history, order_items, orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderLedger::new(pool)
}

fn new_order(user_id: UserId) -> NewOrder {
    NewOrder {
        id: OrderId::new(),
        user_id,
        status: OrderStatus::Confirmed,
        currency: Currency::usd(),
        items: vec![
            NewOrderItem::new("p2", "Gadget", 1, Money::from_cents(250)),
            NewOrderItem::new("p1", "Widget", 2, Money::from_cents(500)),
        ],
        subtotal: Money::from_cents(1250),
        shipping: Money::from_cents(599),
        tax: Money::zero(),
        shipping_address: Address::new("1 Main St", "Springfield", "IL", "62701", "US"),
        payment_method_id: Some("pm_card".to_string()),
        transaction_id: Some("txn_1".to_string()),
        note: "Order created".to_string(),
    }
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let ledger = get_test_ledger().await;
    let user_id = UserId::new();

    let created = ledger.create_order(new_order(user_id)).await.unwrap();

    assert_eq!(created.order.total, Money::from_cents(1849));
    assert_eq!(created.order.status, OrderStatus::Confirmed);
    assert_eq!(created.order.transaction_id.as_deref(), Some("txn_1"));
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.items[0].product_id.as_str(), "p2");
    assert_eq!(created.history.len(), 1);

    let loaded = ledger
        .get_order(&OrderLookup::Id(created.order.id), user_id)
        .await
        .unwrap();
    assert_eq!(loaded, created);
}

#[tokio::test]
async fn test_total_check_constraint_rejects_inconsistent_rows() {
    let ledger = get_test_ledger().await;

    let result = sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, status, currency, subtotal_cents, shipping_cents, tax_cents,
            total_cents, shipping_street, shipping_city, shipping_state, shipping_zip_code, shipping_country)
        VALUES ($1, $2, 'confirmed', 'USD', 100, 10, 0, 999, 's', 'c', '', 'z', 'US')
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(uuid::Uuid::new_v4())
    .execute(ledger.pool())
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_duplicate_order_id_is_rejected() {
    let ledger = get_test_ledger().await;
    let order = new_order(UserId::new());

    ledger.create_order(order.clone()).await.unwrap();
    let err = ledger.create_order(order).await.unwrap_err();

    assert!(matches!(err, OrderError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_other_users_cannot_see_order() {
    let ledger = get_test_ledger().await;
    let created = ledger.create_order(new_order(UserId::new())).await.unwrap();

    let err = ledger
        .get_order(&OrderLookup::Id(created.order.id), UserId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn test_update_status_with_tracking_number() {
    let ledger = get_test_ledger().await;
    let user_id = UserId::new();
    let created = ledger.create_order(new_order(user_id)).await.unwrap();

    let shipped = ledger
        .update_status(
            created.order.id,
            StatusUpdate::new(OrderStatus::Shipped, "handed to carrier")
                .with_tracking_number("1Z999"),
            TransitionPolicy::Lenient,
        )
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));

    let by_tracking = ledger
        .get_order(&OrderLookup::TrackingNumber("1Z999".to_string()), user_id)
        .await
        .unwrap();
    let statuses: Vec<OrderStatus> = by_tracking.history.iter().map(|h| h.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Confirmed, OrderStatus::Shipped]);
    assert_eq!(by_tracking.history[1].note, "handed to carrier");
}

#[tokio::test]
async fn test_strict_transition_rejected_without_history() {
    let ledger = get_test_ledger().await;
    let user_id = UserId::new();
    let created = ledger.create_order(new_order(user_id)).await.unwrap();

    let err = ledger
        .update_status(
            created.order.id,
            StatusUpdate::new(OrderStatus::Pending, ""),
            TransitionPolicy::Strict,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));

    let loaded = ledger
        .get_order(&OrderLookup::Id(created.order.id), user_id)
        .await
        .unwrap();
    assert_eq!(loaded.history.len(), 1);
}

#[tokio::test]
async fn test_cancel_order_rules() {
    let ledger = get_test_ledger().await;
    let user_id = UserId::new();
    let confirmed = ledger.create_order(new_order(user_id)).await.unwrap();
    let shipped = ledger.create_order(new_order(user_id)).await.unwrap();
    ledger
        .update_status(
            shipped.order.id,
            StatusUpdate::new(OrderStatus::Shipped, ""),
            TransitionPolicy::Lenient,
        )
        .await
        .unwrap();

    let cancelled = ledger
        .cancel_order(confirmed.order.id, user_id, "changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = ledger
        .cancel_order(shipped.order.id, user_id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotCancellable {
            status: OrderStatus::Shipped,
            ..
        }
    ));

    let err = ledger
        .cancel_order(confirmed.order.id, UserId::new(), "not mine")
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn test_list_orders_paginates_and_filters() {
    let ledger = get_test_ledger().await;
    let user_id = UserId::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(ledger.create_order(new_order(user_id)).await.unwrap().order.id);
    }
    ledger.create_order(new_order(UserId::new())).await.unwrap();
    ledger.cancel_order(ids[1], user_id, "").await.unwrap();

    let first_page = ledger
        .list_orders(user_id, PageRequest::new(1, 2), None)
        .await
        .unwrap();
    assert_eq!(first_page.total_count, 3);
    assert_eq!(first_page.total_pages, 2);
    assert_eq!(first_page.items.len(), 2);
    assert_eq!(first_page.items[0].id, ids[2]);

    let second_page = ledger
        .list_orders(user_id, PageRequest::new(2, 2), None)
        .await
        .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].id, ids[0]);

    let cancelled = ledger
        .list_orders(user_id, PageRequest::default(), Some(OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.total_count, 1);
    assert_eq!(cancelled.items[0].id, ids[1]);
}

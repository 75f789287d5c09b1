//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, ProductId, UserId, VariantId};
use domain::{
    NewOrder, Order, OrderLine, OrderStatus, PaymentMethod, Product, PromoKind, PromotionalCode,
    ReferralCode, ReferralKind, ShippingAddress, StockKey, TransitionActor, Variant,
};
use sqlx::PgPool;
use store::{CatalogStore, CodeRegistry, OrderRepository, PostgresStore, StockUpdate, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
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
            PostgresStore::new(temp_pool.clone())
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

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE variants, products, orders, promotional_codes, referral_codes CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn tee(stock: i64) -> Product {
    let mut product = Product::with_variants(
        "p1",
        "Tee",
        "apparel",
        vec![
            Variant {
                id: VariantId::new("v1"),
                label: "M".into(),
                stock,
                price: Money::from_major(300),
            },
            Variant {
                id: VariantId::new("v2"),
                label: "L".into(),
                stock: 0,
                price: Money::from_major(320),
            },
        ],
    );
    product.low_stock_threshold = Some(2);
    product
}

fn order(id: &str, user: &str, code: Option<&str>) -> Order {
    Order::new(
        NewOrder {
            id: OrderId::new(id),
            user_id: Some(UserId::new(user)),
            items: vec![OrderLine {
                product_id: ProductId::new("p1"),
                variant_id: Some(VariantId::new("v1")),
                name: "Tee".into(),
                quantity: 2,
                price: Money::from_major(300),
            }],
            payment_method: PaymentMethod::CashOnDelivery,
            payment: None,
            shipping_charge: Money::from_major(50),
            discount_code: code.map(str::to_string),
            discount_amount: Money::zero(),
            shipping_address: ShippingAddress::default(),
        },
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_product_roundtrip_preserves_variant_order() {
    let store = get_test_store().await;
    store.upsert_product(tee(6)).await.unwrap();

    let product = store
        .get_product(&ProductId::new("p1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.variants.len(), 2);
    assert_eq!(product.variants[0].id, VariantId::new("v1"));
    assert_eq!(product.low_stock_threshold, Some(2));
    assert!(product.in_stock);

    let missing = store.get_product(&ProductId::new("nope")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_conditional_decrement_never_goes_negative() {
    let store = get_test_store().await;
    store.upsert_product(tee(6)).await.unwrap();
    let key = StockKey::variant("p1", "v1");

    assert_eq!(
        store.decrement_stock_if_available(&key, 5).await.unwrap(),
        StockUpdate::Applied { remaining: 1 }
    );
    assert_eq!(
        store.decrement_stock_if_available(&key, 5).await.unwrap(),
        StockUpdate::Insufficient
    );
    assert_eq!(
        store
            .decrement_stock_if_available(&StockKey::variant("p1", "v9"), 1)
            .await
            .unwrap(),
        StockUpdate::Missing
    );
    assert_eq!(store.stock_level(&key).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_concurrent_decrements_allocate_at_most_once() {
    let store = get_test_store().await;
    store.upsert_product(tee(6)).await.unwrap();
    let key = StockKey::variant("p1", "v1");

    let (a, b) = tokio::join!(
        store.decrement_stock_if_available(&key, 5),
        store.decrement_stock_if_available(&key, 5)
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let applied = outcomes
        .iter()
        .filter(|o| matches!(o, StockUpdate::Applied { .. }))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(store.stock_level(&key).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_base_counter_and_in_stock_refresh() {
    let store = get_test_store().await;
    store
        .upsert_product(Product::simple(
            "p2",
            "Mug",
            "home",
            Money::from_major(150),
            1,
        ))
        .await
        .unwrap();
    let key = StockKey::base("p2");
    let id = ProductId::new("p2");

    assert_eq!(
        store.decrement_stock_if_available(&key, 1).await.unwrap(),
        StockUpdate::Applied { remaining: 0 }
    );
    assert_eq!(store.refresh_in_stock(&id).await.unwrap(), Some(false));

    assert_eq!(store.increment_stock(&key, 4).await.unwrap(), Some(4));
    assert_eq!(store.refresh_in_stock(&id).await.unwrap(), Some(true));
    assert_eq!(
        store
            .refresh_in_stock(&ProductId::new("nope"))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_order_insert_get_save_delete() {
    let store = get_test_store().await;
    let mut order = order("ORD-1", "u1", None);

    store.insert_order(&order).await.unwrap();
    let duplicate = store.insert_order(&order).await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    order
        .transition_to(
            OrderStatus::Processing,
            TransitionActor::Admin,
            None,
            Utc::now(),
        )
        .unwrap();
    store.save_order(&order).await.unwrap();

    let loaded = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status(), OrderStatus::Processing);
    assert_eq!(loaded.status_history().len(), 2);

    assert!(store.delete_order(&order.id).await.unwrap());
    assert!(!store.delete_order(&order.id).await.unwrap());
    let missing = store.save_order(&order).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_redemption_counts_ignore_cancelled_orders() {
    let store = get_test_store().await;
    let user = UserId::new("u1");

    store
        .insert_order(&order("ORD-1", "u1", Some("save10")))
        .await
        .unwrap();
    let mut cancelled = order("ORD-2", "u1", Some("SAVE10"));
    cancelled
        .transition_to(
            OrderStatus::Cancelled,
            TransitionActor::Customer,
            None,
            Utc::now(),
        )
        .unwrap();
    store.insert_order(&cancelled).await.unwrap();

    assert_eq!(store.count_active_orders(&user).await.unwrap(), 1);
    assert_eq!(
        store.count_code_redemptions(&user, "Save10").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_promotional_usage_is_bounded_by_limit() {
    let store = get_test_store().await;
    let mut code = PromotionalCode::new("Once", PromoKind::Flat(Money::from_major(10)));
    code.usage_limit = Some(1);
    store.upsert_promotional_code(code).await.unwrap();

    assert!(store.try_increment_promotional_usage("ONCE").await.unwrap());
    assert!(!store.try_increment_promotional_usage("once").await.unwrap());

    let found = store.find_promotional_code("oNcE").await.unwrap().unwrap();
    assert_eq!(found.code, "Once");
    assert_eq!(found.usage_count, 1);

    store.decrement_promotional_usage("once").await.unwrap();
    store.decrement_promotional_usage("once").await.unwrap();
    let found = store.find_promotional_code("once").await.unwrap().unwrap();
    assert_eq!(found.usage_count, 0);
}

#[tokio::test]
async fn test_referral_sales_are_attributed_and_reversed() {
    let store = get_test_store().await;
    let mut code = ReferralCode::new("FRIEND", ReferralKind::Percentage(5));
    code.commission_rate = 10;
    store.upsert_referral_code(code).await.unwrap();

    assert!(
        store
            .record_referral_sale("friend", Money::from_major(1000))
            .await
            .unwrap()
    );
    let found = store.find_referral_code("Friend").await.unwrap().unwrap();
    assert_eq!(found.usage_count, 1);
    assert_eq!(found.commission_due(), Money::from_major(100));

    store
        .reverse_referral_sale("FRIEND", Money::from_major(1000))
        .await
        .unwrap();
    let found = store.find_referral_code("FRIEND").await.unwrap().unwrap();
    assert_eq!(found.usage_count, 0);
    assert_eq!(found.total_sales, Money::zero());
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId};
use domain::{Order, OrderStatus, Product, PromotionalCode, ReferralCode, StockKey};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CatalogStore, CodeRegistry, OrderRepository, StockUpdate},
};

/// Faults the in-memory store can be told to inject.
#[derive(Debug, Default)]
struct Faults {
    /// The next decrement on each of these counters fails as if a concurrent
    /// request had taken the stock first.
    lose_race_on: HashSet<StockKey>,
    fail_on_increment: bool,
    fail_on_insert_order: bool,
    fail_on_delete_order: bool,
    fail_on_code_usage: bool,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    /// Keyed by upper-cased code.
    promotional_codes: HashMap<String, PromotionalCode>,
    referral_codes: HashMap<String, ReferralCode>,
    faults: Faults,
}

fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}

fn counter_mut<'a>(product: &'a mut Product, key: &StockKey) -> Option<&'a mut i64> {
    match &key.variant_id {
        Some(variant_id) => product.variant_mut(variant_id).map(|v| &mut v.stock),
        None if !product.has_variants() => product.base_stock.as_mut(),
        None => None,
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Every conditional update runs under one write lock, so it is atomic with
/// respect to other callers sharing the same instance.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next decrement of `key` report `Insufficient` regardless of
    /// the counter, simulating a lost race.
    pub async fn lose_next_race_on(&self, key: StockKey) {
        self.state.write().await.faults.lose_race_on.insert(key);
    }

    /// Configures stock increments to fail.
    pub async fn set_fail_on_increment(&self, fail: bool) {
        self.state.write().await.faults.fail_on_increment = fail;
    }

    /// Configures order inserts to fail.
    pub async fn set_fail_on_insert_order(&self, fail: bool) {
        self.state.write().await.faults.fail_on_insert_order = fail;
    }

    /// Configures order deletes to fail.
    pub async fn set_fail_on_delete_order(&self, fail: bool) {
        self.state.write().await.faults.fail_on_delete_order = fail;
    }

    /// Configures code usage updates to fail.
    pub async fn set_fail_on_code_usage(&self, fail: bool) {
        self.state.write().await.faults.fail_on_code_usage = fail;
    }

    /// Returns the level of one counter.
    pub async fn stock_level(&self, key: &StockKey) -> Option<i64> {
        let state = self.state.read().await;
        state
            .products
            .get(&key.product_id)
            .and_then(|p| p.stock_for(key.variant_id.as_ref()))
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn upsert_product(&self, mut product: Product) -> Result<()> {
        product.in_stock = product.computed_in_stock();
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
        Ok(())
    }

    async fn decrement_stock_if_available(
        &self,
        key: &StockKey,
        quantity: u32,
    ) -> Result<StockUpdate> {
        let mut state = self.state.write().await;

        if state.faults.lose_race_on.remove(key) {
            return Ok(StockUpdate::Insufficient);
        }

        let Some(counter) = state
            .products
            .get_mut(&key.product_id)
            .and_then(|p| counter_mut(p, key))
        else {
            return Ok(StockUpdate::Missing);
        };

        let quantity = i64::from(quantity);
        if *counter < quantity {
            return Ok(StockUpdate::Insufficient);
        }
        *counter -= quantity;
        Ok(StockUpdate::Applied {
            remaining: *counter,
        })
    }

    async fn increment_stock(&self, key: &StockKey, quantity: u32) -> Result<Option<i64>> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_increment {
            return Err(StoreError::Unavailable(format!(
                "increment of {key} refused"
            )));
        }

        Ok(state
            .products
            .get_mut(&key.product_id)
            .and_then(|p| counter_mut(p, key))
            .map(|counter| {
                *counter += i64::from(quantity);
                *counter
            }))
    }

    async fn refresh_in_stock(&self, id: &ProductId) -> Result<Option<bool>> {
        let mut state = self.state.write().await;
        Ok(state.products.get_mut(id).map(|product| {
            product.in_stock = product.computed_in_stock();
            product.in_stock
        }))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_insert_order {
            return Err(StoreError::Unavailable("order insert refused".to_string()));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("order {}", order.id))),
        }
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_delete_order {
            return Err(StoreError::Unavailable(format!("delete of order {id} refused")));
        }
        Ok(state.orders.remove(id).is_some())
    }

    async fn count_active_orders(&self, user_id: &UserId) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.user_id.as_ref() == Some(user_id))
            .filter(|o| o.status() != OrderStatus::Cancelled)
            .count() as u64)
    }

    async fn count_code_redemptions(&self, user_id: &UserId, code: &str) -> Result<u64> {
        let wanted = code_key(code);
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.user_id.as_ref() == Some(user_id))
            .filter(|o| o.status() != OrderStatus::Cancelled)
            .filter(|o| o.discount_code.as_deref().is_some_and(|c| code_key(c) == wanted))
            .count() as u64)
    }
}

#[async_trait]
impl CodeRegistry for InMemoryStore {
    async fn find_promotional_code(&self, code: &str) -> Result<Option<PromotionalCode>> {
        let state = self.state.read().await;
        Ok(state.promotional_codes.get(&code_key(code)).cloned())
    }

    async fn find_referral_code(&self, code: &str) -> Result<Option<ReferralCode>> {
        let state = self.state.read().await;
        Ok(state.referral_codes.get(&code_key(code)).cloned())
    }

    async fn upsert_promotional_code(&self, code: PromotionalCode) -> Result<()> {
        self.state
            .write()
            .await
            .promotional_codes
            .insert(code_key(&code.code), code);
        Ok(())
    }

    async fn upsert_referral_code(&self, code: ReferralCode) -> Result<()> {
        self.state
            .write()
            .await
            .referral_codes
            .insert(code_key(&code.code), code);
        Ok(())
    }

    async fn try_increment_promotional_usage(&self, code: &str) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_code_usage {
            return Err(StoreError::Unavailable(format!("usage update of {code} refused")));
        }

        let Some(promo) = state.promotional_codes.get_mut(&code_key(code)) else {
            return Ok(false);
        };
        if let Some(limit) = promo.usage_limit
            && promo.usage_count >= limit
        {
            return Ok(false);
        }
        promo.usage_count += 1;
        Ok(true)
    }

    async fn decrement_promotional_usage(&self, code: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_code_usage {
            return Err(StoreError::Unavailable(format!("usage update of {code} refused")));
        }
        if let Some(promo) = state.promotional_codes.get_mut(&code_key(code)) {
            promo.usage_count = promo.usage_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn record_referral_sale(&self, code: &str, sale: Money) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_code_usage {
            return Err(StoreError::Unavailable(format!("usage update of {code} refused")));
        }

        let Some(referral) = state.referral_codes.get_mut(&code_key(code)) else {
            return Ok(false);
        };
        referral.usage_count += 1;
        referral.total_sales += sale;
        Ok(true)
    }

    async fn reverse_referral_sale(&self, code: &str, sale: Money) -> Result<()> {
        let mut state = self.state.write().await;

        if state.faults.fail_on_code_usage {
            return Err(StoreError::Unavailable(format!("usage update of {code} refused")));
        }
        if let Some(referral) = state.referral_codes.get_mut(&code_key(code)) {
            referral.usage_count = referral.usage_count.saturating_sub(1);
            referral.total_sales = referral.total_sales.saturating_sub(sale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::VariantId;
    use domain::{
        NewOrder, OrderLine, PaymentMethod, PromoKind, ReferralKind, ShippingAddress,
        TransitionActor, Variant,
    };

    use super::*;

    fn tee() -> Product {
        Product::with_variants(
            "p1",
            "Tee",
            "apparel",
            vec![
                Variant {
                    id: VariantId::new("v1"),
                    label: "M".into(),
                    stock: 6,
                    price: Money::from_major(300),
                },
                Variant {
                    id: VariantId::new("v2"),
                    label: "L".into(),
                    stock: 0,
                    price: Money::from_major(300),
                },
            ],
        )
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
                    quantity: 1,
                    price: Money::from_major(300),
                }],
                payment_method: PaymentMethod::CashOnDelivery,
                payment: None,
                shipping_charge: Money::zero(),
                discount_code: code.map(str::to_string),
                discount_amount: Money::zero(),
                shipping_address: ShippingAddress::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let store = InMemoryStore::new();
        store.upsert_product(tee()).await.unwrap();
        let key = StockKey::variant("p1", "v1");

        assert_eq!(
            store.decrement_stock_if_available(&key, 5).await.unwrap(),
            StockUpdate::Applied { remaining: 1 }
        );
        assert_eq!(
            store.decrement_stock_if_available(&key, 5).await.unwrap(),
            StockUpdate::Insufficient
        );
        assert_eq!(store.stock_level(&key).await, Some(1));
    }

    #[tokio::test]
    async fn test_decrement_of_unknown_counter_is_missing() {
        let store = InMemoryStore::new();
        store.upsert_product(tee()).await.unwrap();

        let unknown_variant = StockKey::variant("p1", "v9");
        let base_of_variant_product = StockKey::base("p1");
        let unknown_product = StockKey::base("p9");

        for key in [unknown_variant, base_of_variant_product, unknown_product] {
            assert_eq!(
                store.decrement_stock_if_available(&key, 1).await.unwrap(),
                StockUpdate::Missing
            );
        }
    }

    #[tokio::test]
    async fn test_lost_race_fires_once() {
        let store = InMemoryStore::new();
        store.upsert_product(tee()).await.unwrap();
        let key = StockKey::variant("p1", "v1");

        store.lose_next_race_on(key.clone()).await;
        assert_eq!(
            store.decrement_stock_if_available(&key, 1).await.unwrap(),
            StockUpdate::Insufficient
        );
        assert!(matches!(
            store.decrement_stock_if_available(&key, 1).await.unwrap(),
            StockUpdate::Applied { remaining: 5 }
        ));
    }

    #[tokio::test]
    async fn test_increment_and_refresh_in_stock() {
        let store = InMemoryStore::new();
        let mut product = tee();
        product.variants[0].stock = 0;
        store.upsert_product(product).await.unwrap();
        let stored = store.get_product(&ProductId::new("p1")).await.unwrap().unwrap();
        assert!(!stored.in_stock);

        let level = store
            .increment_stock(&StockKey::variant("p1", "v2"), 3)
            .await
            .unwrap();
        assert_eq!(level, Some(3));
        assert_eq!(
            store.refresh_in_stock(&ProductId::new("p1")).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            store.increment_stock(&StockKey::base("p9"), 1).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_insert_duplicate_order_conflicts() {
        let store = InMemoryStore::new();
        let order = order("ORD-1", "u1", None);
        store.insert_order(&order).await.unwrap();

        let result = store.insert_order(&order).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_save_missing_order_fails() {
        let store = InMemoryStore::new();
        let result = store.save_order(&order("ORD-1", "u1", None)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_redemption_counts_skip_cancelled_orders() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store.insert_order(&order("ORD-1", "u1", Some("save10"))).await.unwrap();

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
        store.insert_order(&order("ORD-3", "u2", Some("SAVE10"))).await.unwrap();

        assert_eq!(store.count_active_orders(&user).await.unwrap(), 1);
        assert_eq!(store.count_code_redemptions(&user, "Save10").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promotional_usage_respects_limit() {
        let store = InMemoryStore::new();
        let mut code = PromotionalCode::new("Once", PromoKind::Percent(10));
        code.usage_limit = Some(1);
        store.upsert_promotional_code(code).await.unwrap();

        assert!(store.try_increment_promotional_usage("ONCE").await.unwrap());
        assert!(!store.try_increment_promotional_usage("once").await.unwrap());

        store.decrement_promotional_usage("once").await.unwrap();
        store.decrement_promotional_usage("once").await.unwrap();
        let code = store.find_promotional_code("once").await.unwrap().unwrap();
        assert_eq!(code.usage_count, 0);
    }

    #[tokio::test]
    async fn test_referral_sales_attribution() {
        let store = InMemoryStore::new();
        let code = ReferralCode::new("FRIEND", ReferralKind::Fixed(Money::from_major(50)));
        store.upsert_referral_code(code).await.unwrap();

        assert!(store.record_referral_sale("friend", Money::from_major(900)).await.unwrap());
        store
            .reverse_referral_sale("FRIEND", Money::from_major(1000))
            .await
            .unwrap();

        let code = store.find_referral_code("Friend").await.unwrap().unwrap();
        assert_eq!(code.usage_count, 0);
        assert_eq!(code.total_sales, Money::zero());
        assert!(!store.record_referral_sale("NOPE", Money::from_major(1)).await.unwrap());
    }
}

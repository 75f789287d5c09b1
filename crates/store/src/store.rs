use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId};
use domain::{Order, Product, PromotionalCode, ReferralCode, StockKey};

use crate::Result;

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// The counter held enough units and was decremented.
    Applied { remaining: i64 },
    /// The counter exists but holds fewer units than requested.
    Insufficient,
    /// No such product or variant.
    Missing,
}

/// Authoritative stock counters and the products that own them.
///
/// Counters are only mutated through single-record conditional updates, so
/// concurrent handlers in separate processes can never drive one negative.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Retrieves a product with its variants.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Retrieves several products at once. Unknown ids are absent from the map.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Inserts or replaces a product and its variants.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Decrements a counter only if it currently holds at least `quantity`.
    async fn decrement_stock_if_available(
        &self,
        key: &StockKey,
        quantity: u32,
    ) -> Result<StockUpdate>;

    /// Increments a counter. Returns the new level, or `None` if the counter
    /// does not exist.
    async fn increment_stock(&self, key: &StockKey, quantity: u32) -> Result<Option<i64>>;

    /// Recomputes the derived `in_stock` flag from the live counters.
    ///
    /// Returns the new flag, or `None` for an unknown product.
    async fn refresh_in_stock(&self, id: &ProductId) -> Result<Option<bool>>;
}

/// Order records.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order. Fails with `Conflict` if the id is taken.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Replaces an existing order. Fails with `NotFound` if it is missing.
    async fn save_order(&self, order: &Order) -> Result<()>;

    /// Deletes an order. Returns false if it did not exist.
    async fn delete_order(&self, id: &OrderId) -> Result<bool>;

    /// Counts the user's orders that are not cancelled.
    async fn count_active_orders(&self, user_id: &UserId) -> Result<u64>;

    /// Counts the user's non-cancelled orders that redeemed `code`
    /// (case-insensitive).
    async fn count_code_redemptions(&self, user_id: &UserId, code: &str) -> Result<u64>;
}

/// Promotional and referral code registries.
///
/// Lookups are case-insensitive. Usage counters are updated atomically.
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    async fn find_promotional_code(&self, code: &str) -> Result<Option<PromotionalCode>>;

    async fn find_referral_code(&self, code: &str) -> Result<Option<ReferralCode>>;

    async fn upsert_promotional_code(&self, code: PromotionalCode) -> Result<()>;

    async fn upsert_referral_code(&self, code: ReferralCode) -> Result<()>;

    /// Increments `usage_count` only while it is below `usage_limit`.
    ///
    /// Returns false if the code is unknown or the limit was reached.
    async fn try_increment_promotional_usage(&self, code: &str) -> Result<bool>;

    /// Decrements `usage_count`, never below zero.
    async fn decrement_promotional_usage(&self, code: &str) -> Result<()>;

    /// Adds one redemption and `sale` to the referral's attributed sales.
    ///
    /// Returns false if the code is unknown.
    async fn record_referral_sale(&self, code: &str, sale: Money) -> Result<bool>;

    /// Reverses one redemption and `sale`, never below zero.
    async fn reverse_referral_sale(&self, code: &str, sale: Money) -> Result<()>;
}

/// Everything the fulfillment engine needs from persistence.
pub trait Store: CatalogStore + OrderRepository + CodeRegistry + Clone + 'static {}

impl<T> Store for T where T: CatalogStore + OrderRepository + CodeRegistry + Clone + 'static {}

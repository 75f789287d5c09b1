//! Inventory ledger: validation, guarded deduction and restocking.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use common::ProductId;
use domain::{AggregatedDemand, OrderLine, Product, StockKey};
use store::{CatalogStore, StockUpdate};

use crate::compensation::UndoLog;
use crate::error::SagaError;
use crate::services::{Notification, Notifier};
use crate::timeout::with_timeout;

/// What a restock pass managed to put back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestockReport {
    pub restored: Vec<StockKey>,
    /// Counters that could not be incremented, with the cause.
    pub skipped: Vec<(StockKey, String)>,
}

/// Authoritative stock operations on top of a [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct InventoryLedger<S, N> {
    store: S,
    notifier: N,
    default_threshold: i64,
    notify_timeout: Duration,
}

impl<S, N> InventoryLedger<S, N>
where
    S: CatalogStore,
    N: Notifier + Clone + 'static,
{
    pub fn new(store: S, notifier: N, default_threshold: i64, notify_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            default_threshold,
            notify_timeout,
        }
    }

    /// Checks every entry against the live counters without changing them.
    ///
    /// Stops at the first entry that cannot be satisfied.
    #[tracing::instrument(skip(self, demand), fields(entries = demand.len()))]
    pub async fn validate(&self, demand: &[AggregatedDemand]) -> Result<(), SagaError> {
        let products = self.load_products(demand).await?;

        for entry in demand {
            let product = products.get(&entry.key.product_id).ok_or_else(|| {
                SagaError::NotFound(format!("Product '{}' not found", entry.display_name))
            })?;
            let available = product
                .stock_for(entry.key.variant_id.as_ref())
                .ok_or_else(|| {
                    SagaError::NotFound(format!(
                        "Selected option of '{}' not found",
                        entry.display_name
                    ))
                })?;

            let requested = i64::from(entry.quantity);
            if available < requested {
                return Err(SagaError::Conflict(format!(
                    "Insufficient stock for '{}': requested {}, available {} (short by {})",
                    entry.display_name,
                    requested,
                    available.max(0),
                    requested - available.max(0)
                )));
            }
        }
        Ok(())
    }

    /// Applies one conditional decrement per entry.
    ///
    /// If any entry cannot be decremented, every decrement already applied in
    /// this call is reversed before `Conflict` is returned.
    #[tracing::instrument(skip(self, demand), fields(entries = demand.len()))]
    pub async fn deduct(&self, demand: &[AggregatedDemand]) -> Result<(), SagaError> {
        let products = self.load_products(demand).await?;
        let mut undo = UndoLog::new();
        let mut alerts = Vec::new();

        for entry in demand {
            let update = self
                .store
                .decrement_stock_if_available(&entry.key, entry.quantity)
                .await;

            let failure = match update {
                Ok(StockUpdate::Applied { remaining }) => {
                    undo.record(entry.key.clone(), entry.quantity);
                    if let Some(alert) = self.low_stock_alert(entry, remaining, &products) {
                        alerts.push(alert);
                    }
                    continue;
                }
                Ok(StockUpdate::Insufficient) => SagaError::Conflict(format!(
                    "Insufficient stock for '{}': it sold out while your order was placed",
                    entry.display_name
                )),
                Ok(StockUpdate::Missing) => SagaError::Conflict(format!(
                    "'{}' is no longer available",
                    entry.display_name
                )),
                Err(e) => SagaError::Persistence(e),
            };

            metrics::counter!("stock_conflicts_total").increment(1);
            tracing::warn!(
                key = %entry.key,
                applied = undo.len(),
                error = %failure,
                "stock deduction failed, rolling back"
            );

            let failures = undo.rollback(&self.store).await;
            metrics::counter!("stock_rollbacks_total").increment(1);
            if !failures.is_empty() {
                tracing::error!(
                    reconciliation_required = true,
                    unreversed = failures.len(),
                    "stock rollback incomplete, counters are below their true level"
                );
            }
            self.recompute_in_stock(demand.iter().map(|d| &d.key.product_id))
                .await;
            return Err(failure);
        }

        self.recompute_in_stock(demand.iter().map(|d| &d.key.product_id))
            .await;
        for alert in alerts {
            self.dispatch(alert);
        }
        Ok(())
    }

    /// Puts every line's quantity back. Never fails; problems are logged.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn restock(&self, lines: &[OrderLine]) -> RestockReport {
        let mut report = RestockReport::default();

        for line in lines {
            let key = line.stock_key();
            match self.store.increment_stock(&key, line.quantity).await {
                Ok(Some(level)) => {
                    tracing::debug!(key = %key, level, "restocked");
                    report.restored.push(key);
                }
                Ok(None) => {
                    tracing::warn!(key = %key, "restock skipped, counter no longer exists");
                    report.skipped.push((key, "counter not found".to_string()));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "restock failed");
                    report.skipped.push((key, e.to_string()));
                }
            }
        }

        self.recompute_in_stock(lines.iter().map(|l| &l.product_id))
            .await;
        report
    }

    /// Recomputes the derived in-stock flag of each product once.
    pub async fn recompute_in_stock<'a>(&self, ids: impl IntoIterator<Item = &'a ProductId>) {
        let unique: BTreeSet<&ProductId> = ids.into_iter().collect();
        for id in unique {
            if let Err(e) = self.store.refresh_in_stock(id).await {
                tracing::warn!(product_id = %id, error = %e, "failed to refresh in_stock");
            }
        }
    }

    async fn load_products(
        &self,
        demand: &[AggregatedDemand],
    ) -> Result<HashMap<ProductId, Product>, SagaError> {
        let ids: Vec<ProductId> = demand
            .iter()
            .map(|d| d.key.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(self.store.get_products(&ids).await?)
    }

    fn low_stock_alert(
        &self,
        entry: &AggregatedDemand,
        remaining: i64,
        products: &HashMap<ProductId, Product>,
    ) -> Option<Notification> {
        let product = products.get(&entry.key.product_id);
        let threshold = product.map_or(self.default_threshold, |p| {
            p.threshold_or(self.default_threshold)
        });
        (remaining <= threshold).then(|| Notification::LowStock {
            key: entry.key.clone(),
            product_name: product.map_or_else(|| entry.display_name.clone(), |p| p.name.clone()),
            remaining,
            threshold,
        })
    }

    /// Sends a notification in the background. Failures are logged only.
    fn dispatch(&self, notification: Notification) {
        metrics::counter!("low_stock_alerts_total").increment(1);
        let notifier = self.notifier.clone();
        let limit = self.notify_timeout;
        tokio::spawn(async move {
            let sent = with_timeout("notification", limit, notifier.notify(notification)).await;
            if let Err(e) = sent {
                tracing::warn!(error = %e, "low-stock notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, VariantId};
    use domain::Variant;
    use store::InMemoryStore;

    use crate::services::InMemoryNotifier;

    fn tee(stock_m: i64, stock_l: i64) -> Product {
        let variant = |id: &str, stock| Variant {
            id: VariantId::new(id),
            label: id.to_uppercase(),
            stock,
            price: Money::from_major(300),
        };
        let mut product = Product::with_variants(
            "p1",
            "Tee",
            "apparel",
            vec![variant("m", stock_m), variant("l", stock_l)],
        );
        product.low_stock_threshold = Some(2);
        product
    }

    async fn ledger(
        stock_m: i64,
        stock_l: i64,
    ) -> (
        InventoryLedger<InMemoryStore, InMemoryNotifier>,
        InMemoryStore,
        InMemoryNotifier,
    ) {
        let store = InMemoryStore::new();
        store.upsert_product(tee(stock_m, stock_l)).await.unwrap();
        let notifier = InMemoryNotifier::new();
        let ledger = InventoryLedger::new(
            store.clone(),
            notifier.clone(),
            5,
            Duration::from_secs(1),
        );
        (ledger, store, notifier)
    }

    fn demand(variant: &str, quantity: u32) -> AggregatedDemand {
        AggregatedDemand::new(StockKey::variant("p1", variant), quantity, "Tee")
    }

    async fn wait_for_notifications(notifier: &InMemoryNotifier, count: usize) {
        for _ in 0..100 {
            if notifier.sent().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_validate_names_shortfall() {
        let (ledger, _, _) = ledger(3, 0).await;

        ledger.validate(&[demand("m", 3)]).await.unwrap();

        let err = ledger.validate(&[demand("m", 5)]).await.unwrap_err();
        assert!(matches!(err, SagaError::Conflict(_)));
        let message = err.to_string();
        assert!(message.contains("Tee"));
        assert!(message.contains("short by 2"));
    }

    #[tokio::test]
    async fn test_validate_missing_product_or_variant_is_not_found() {
        let (ledger, _, _) = ledger(3, 0).await;

        let missing_variant = ledger.validate(&[demand("xl", 1)]).await.unwrap_err();
        assert!(matches!(missing_variant, SagaError::NotFound(_)));

        let missing_product = AggregatedDemand::new(StockKey::base("p9"), 1, "Ghost");
        let err = ledger.validate(&[missing_product]).await.unwrap_err();
        assert!(matches!(err, SagaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deduct_applies_exact_quantities() {
        let (ledger, store, _) = ledger(10, 10).await;

        ledger
            .deduct(&[demand("m", 4), demand("l", 1)])
            .await
            .unwrap();

        assert_eq!(store.stock_level(&StockKey::variant("p1", "m")).await, Some(6));
        assert_eq!(store.stock_level(&StockKey::variant("p1", "l")).await, Some(9));
    }

    #[tokio::test]
    async fn test_deduct_rolls_back_on_lost_race() {
        let (ledger, store, _) = ledger(10, 10).await;
        store.lose_next_race_on(StockKey::variant("p1", "l")).await;

        let err = ledger
            .deduct(&[demand("m", 4), demand("l", 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::Conflict(_)));
        assert_eq!(store.stock_level(&StockKey::variant("p1", "m")).await, Some(10));
        assert_eq!(store.stock_level(&StockKey::variant("p1", "l")).await, Some(10));
    }

    #[tokio::test]
    async fn test_deduct_to_zero_clears_in_stock() {
        let (ledger, store, _) = ledger(2, 0).await;

        ledger.deduct(&[demand("m", 2)]).await.unwrap();

        let product = store.get_product(&ProductId::new("p1")).await.unwrap().unwrap();
        assert!(!product.in_stock);
    }

    #[tokio::test]
    async fn test_low_stock_alert_uses_product_threshold() {
        let (ledger, _, notifier) = ledger(5, 10).await;

        ledger.deduct(&[demand("m", 2)]).await.unwrap();
        ledger.deduct(&[demand("m", 1)]).await.unwrap();
        wait_for_notifications(&notifier, 1).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            Notification::LowStock {
                remaining: 2,
                threshold: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let (ledger, store, notifier) = ledger(3, 0).await;
        notifier.set_fail_on_send(true);

        ledger.deduct(&[demand("m", 3)]).await.unwrap();

        assert_eq!(store.stock_level(&StockKey::variant("p1", "m")).await, Some(0));
    }

    #[tokio::test]
    async fn test_restock_skips_missing_counters() {
        let (ledger, store, _) = ledger(1, 1).await;
        let line = |variant: &str| OrderLine {
            product_id: ProductId::new("p1"),
            variant_id: Some(VariantId::new(variant)),
            name: "Tee".into(),
            quantity: 2,
            price: Money::from_major(300),
        };

        let report = ledger.restock(&[line("m"), line("gone")]).await;

        assert_eq!(report.restored, vec![StockKey::variant("p1", "m")]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(store.stock_level(&StockKey::variant("p1", "m")).await, Some(3));
    }
}

//! Checkout saga coordinator.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use common::{Money, OrderId, ProductId, UserId};
use domain::{
    AggregatedDemand, CartItem, DemandResolver, DiscountOutcome, NewOrder, Order, OrderLine,
    PaymentDetails, PaymentMethod, Product, RawLineItem, Shipment, ShippingAddress,
};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::discounts::DiscountEngine;
use crate::error::SagaError;
use crate::ledger::InventoryLedger;
use crate::services::{
    CarrierClient, GatewayOrder, Notification, Notifier, PaymentGateway, SignatureVerifier,
};
use crate::settings::FulfillmentSettings;
use crate::state::{CheckoutStep, DegradedStep};
use crate::timeout::with_timeout;

/// Payment confirmation returned to the client by the gateway's checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// A cart submitted for checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub items: Vec<RawLineItem>,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment: Option<PaymentConfirmation>,
    #[serde(default)]
    pub shipping_address: ShippingAddress,
}

/// Result of a committed checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub discount: Option<DiscountOutcome>,
    /// Best-effort steps that did not complete.
    pub degraded: Vec<DegradedStep>,
}

/// A cart resolved against the catalog and priced from it.
#[derive(Debug, Clone)]
struct PricedCart {
    demand: Vec<AggregatedDemand>,
    lines: Vec<OrderLine>,
    cart_items: Vec<CartItem>,
    subtotal: Money,
}

/// Drives a cart through validation, payment verification, persistence,
/// stock deduction and the best-effort integrations that follow.
///
/// Only the first four steps can fail a checkout. A failed deduction deletes
/// the order it just persisted, so a rejected checkout leaves neither an order
/// nor a stock change behind.
pub struct SagaCoordinator<S, P, C, N> {
    store: S,
    ledger: InventoryLedger<S, N>,
    discounts: DiscountEngine<S>,
    resolver: DemandResolver,
    payment: P,
    carrier: C,
    notifier: N,
    verifier: SignatureVerifier,
    settings: FulfillmentSettings,
}

impl<S, P, C, N> SagaCoordinator<S, P, C, N>
where
    S: Store,
    P: PaymentGateway,
    C: CarrierClient,
    N: Notifier + Clone + 'static,
{
    pub fn new(
        store: S,
        payment: P,
        carrier: C,
        notifier: N,
        verifier: SignatureVerifier,
        settings: FulfillmentSettings,
    ) -> Self {
        let ledger = InventoryLedger::new(
            store.clone(),
            notifier.clone(),
            settings.low_stock_threshold,
            settings.external_timeout,
        );
        let discounts = DiscountEngine::new(store.clone(), settings.eligibility);
        Self {
            store,
            ledger,
            discounts,
            resolver: DemandResolver::default(),
            payment,
            carrier,
            notifier,
            verifier,
            settings,
        }
    }

    /// Runs the checkout saga.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = ?request.user_id, lines = request.items.len())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, SagaError> {
        metrics::counter!("checkout_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run_checkout(request).await;

        metrics::histogram!("checkout_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("checkout_failed", "kind" => e.kind().as_str()).increment(1);
            tracing::warn!(error = %e, "checkout rejected");
        }
        result
    }

    async fn run_checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, SagaError> {
        // 1. Resolve, price and validate; nothing has been written yet.
        tracing::info!(step = %CheckoutStep::ValidateDemand, "saga step started");
        let cart = self.price_cart(&request.items).await?;
        self.ledger.validate(&cart.demand).await?;

        let discount = match request.discount_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(
                self.discounts
                    .evaluate(
                        code,
                        cart.subtotal,
                        &cart.cart_items,
                        request.user_id.as_ref(),
                    )
                    .await?,
            ),
            _ => None,
        };
        let shipping_charge = if discount.as_ref().is_some_and(|d| d.free_shipping) {
            Money::zero()
        } else {
            self.settings.shipping.charge_for(cart.subtotal)
        };

        // 2. Verify the gateway's signature before accepting an online payment.
        tracing::info!(step = %CheckoutStep::VerifyPayment, "saga step started");
        let payment = self.verify_payment(&request)?;

        // 3. Persist.
        tracing::info!(step = %CheckoutStep::PersistOrder, "saga step started");
        let mut order = Order::new(
            NewOrder {
                id: OrderId::generate(),
                user_id: request.user_id,
                items: cart.lines,
                payment_method: request.payment_method,
                payment,
                shipping_charge,
                discount_code: discount.as_ref().map(|d| d.code.clone()),
                discount_amount: discount.as_ref().map_or(Money::zero(), |d| d.amount),
                shipping_address: request.shipping_address,
            },
            Utc::now(),
        )?;
        self.store.insert_order(&order).await?;
        tracing::info!(order_id = %order.id, amount = %order.amount, "order persisted");

        // 4. Deduct stock; a failure un-persists the order.
        tracing::info!(
            step = %CheckoutStep::DeductStock,
            order_id = %order.id,
            "saga step started"
        );
        if let Err(e) = self.ledger.deduct(&cart.demand).await {
            self.discard_order(&order.id).await;
            return Err(e);
        }

        let mut degraded = Vec::new();

        // 5. Count the code redemption.
        if let Some(outcome) = &discount {
            tracing::info!(
                step = %CheckoutStep::RecordDiscountUsage,
                order_id = %order.id,
                "saga step started"
            );
            match self.discounts.record_usage(outcome, order.subtotal).await {
                Ok(()) => {
                    order.discount_usage_recorded = true;
                    if let Err(e) = self.store.save_order(&order).await {
                        tracing::error!(
                            order_id = %order.id,
                            code = %outcome.code,
                            error = %e,
                            reconciliation_required = true,
                            "discount usage counted but not marked on the order"
                        );
                        degraded.push(DegradedStep {
                            step: CheckoutStep::RecordDiscountUsage,
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        code = %outcome.code,
                        error = %e,
                        "discount usage not recorded"
                    );
                    degraded.push(DegradedStep {
                        step: CheckoutStep::RecordDiscountUsage,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // 6. Ship.
        tracing::info!(
            step = %CheckoutStep::CreateShipment,
            order_id = %order.id,
            "saga step started"
        );
        if let Err(e) = self.create_shipment(&mut order).await {
            tracing::warn!(order_id = %order.id, error = %e, "shipment not created");
            degraded.push(DegradedStep {
                step: CheckoutStep::CreateShipment,
                reason: e.to_string(),
            });
        }
        if order.shipment.is_some()
            && let Err(e) = self.store.save_order(&order).await
        {
            tracing::error!(order_id = %order.id, error = %e, "shipment details not saved");
            degraded.push(DegradedStep {
                step: CheckoutStep::CreateShipment,
                reason: e.to_string(),
            });
        }

        // 7. Tell the operators.
        tracing::info!(
            step = %CheckoutStep::NotifyOperators,
            order_id = %order.id,
            "saga step started"
        );
        let notification = Notification::NewOrder {
            order_id: order.id.clone(),
            amount: order.amount,
            items: order.total_quantity(),
        };
        let notified = with_timeout(
            "notification",
            self.settings.external_timeout,
            self.notifier.notify(notification),
        )
        .await;
        if let Err(e) = notified {
            tracing::warn!(order_id = %order.id, error = %e, "new-order notification failed");
            degraded.push(DegradedStep {
                step: CheckoutStep::NotifyOperators,
                reason: e.to_string(),
            });
        }

        tracing::info!(
            order_id = %order.id,
            degraded = degraded.len(),
            "checkout completed"
        );
        Ok(CheckoutOutcome {
            order,
            discount,
            degraded,
        })
    }

    /// Evaluates a discount code against a cart without reserving anything.
    #[tracing::instrument(skip(self, items))]
    pub async fn preview_discount(
        &self,
        code: &str,
        items: &[RawLineItem],
        user_id: Option<&UserId>,
    ) -> Result<DiscountOutcome, SagaError> {
        let cart = self.price_cart(items).await?;
        self.discounts
            .evaluate(code, cart.subtotal, &cart.cart_items, user_id)
            .await
    }

    /// Registers an order with the payment gateway ahead of payment.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_order(
        &self,
        amount: Money,
        receipt: &str,
    ) -> Result<GatewayOrder, SagaError> {
        if !amount.is_positive() {
            return Err(SagaError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        with_timeout(
            "payment",
            self.settings.external_timeout,
            self.payment
                .create_order(amount, &self.settings.currency, receipt),
        )
        .await
    }

    async fn price_cart(&self, items: &[RawLineItem]) -> Result<PricedCart, SagaError> {
        let ids: Vec<ProductId> = items
            .iter()
            .filter_map(|line| line.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self.store.get_products(&ids).await?;

        let resolved = self.resolver.resolve(items, &products)?;
        let demand = DemandResolver::aggregate(&resolved)?;
        let lines = price_lines(&demand, &products)?;

        let cart_items = lines
            .iter()
            .filter_map(|line| {
                let product = products.get(&line.product_id)?;
                Some(CartItem {
                    product_id: line.product_id.clone(),
                    category: product.category.clone(),
                    subcategory: product.subcategory.clone(),
                    line_total: line.total(),
                })
            })
            .collect();
        let subtotal = lines.iter().map(OrderLine::total).sum();

        Ok(PricedCart {
            demand,
            lines,
            cart_items,
            subtotal,
        })
    }

    fn verify_payment(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Option<PaymentDetails>, SagaError> {
        match request.payment_method {
            PaymentMethod::CashOnDelivery => Ok(None),
            PaymentMethod::Online => {
                let confirmation = request.payment.as_ref().ok_or_else(|| {
                    SagaError::Validation("Payment details are required".to_string())
                })?;
                if !self.verifier.verify(
                    &confirmation.gateway_order_id,
                    &confirmation.payment_id,
                    &confirmation.signature,
                ) {
                    metrics::counter!("payment_signature_rejected_total").increment(1);
                    return Err(SagaError::Validation(
                        "Payment verification failed".to_string(),
                    ));
                }
                Ok(Some(PaymentDetails {
                    gateway_order_id: confirmation.gateway_order_id.clone(),
                    payment_id: confirmation.payment_id.clone(),
                }))
            }
        }
    }

    async fn discard_order(&self, order_id: &OrderId) {
        match self.store.delete_order(order_id).await {
            Ok(true) => {
                tracing::info!(order_id = %order_id, "order discarded after failed deduction");
            }
            Ok(false) => {
                tracing::warn!(order_id = %order_id, "order to discard was already gone");
            }
            Err(e) => tracing::error!(
                order_id = %order_id,
                error = %e,
                reconciliation_required = true,
                "failed to discard order after failed deduction"
            ),
        }
    }

    /// Creates the shipment, assigns a courier and books the pickup.
    ///
    /// Shipment metadata obtained before a failure stays on the order.
    async fn create_shipment(&self, order: &mut Order) -> Result<(), SagaError> {
        let limit = self.settings.external_timeout;

        let created = with_timeout("carrier", limit, self.carrier.create_shipment(order)).await?;
        let shipment_id = created.shipment_id.clone();
        order.shipment = Some(Shipment {
            carrier_order_id: created.carrier_order_id,
            shipment_id: created.shipment_id,
            tracking_code: None,
            carrier_name: None,
        });

        let Some(assignment) =
            with_timeout("carrier", limit, self.carrier.assign_tracking(&shipment_id)).await?
        else {
            tracing::info!(order_id = %order.id, "no courier assigned yet");
            return Ok(());
        };
        if let Some(shipment) = order.shipment.as_mut() {
            shipment.tracking_code = Some(assignment.tracking_code);
            shipment.carrier_name = Some(assignment.carrier_name);
        }

        with_timeout("carrier", limit, self.carrier.schedule_pickup(&shipment_id)).await
    }
}

fn price_lines(
    demand: &[AggregatedDemand],
    products: &HashMap<ProductId, Product>,
) -> Result<Vec<OrderLine>, SagaError> {
    demand
        .iter()
        .map(|entry| {
            let product = products.get(&entry.key.product_id).ok_or_else(|| {
                SagaError::NotFound(format!("Product '{}' not found", entry.display_name))
            })?;
            let price = product
                .unit_price(entry.key.variant_id.as_ref())
                .ok_or_else(|| {
                    SagaError::NotFound(format!(
                        "Selected option of '{}' not found",
                        entry.display_name
                    ))
                })?;
            Ok(OrderLine {
                product_id: entry.key.product_id.clone(),
                variant_id: entry.key.variant_id.clone(),
                name: entry.display_name.clone(),
                quantity: entry.quantity,
                price,
            })
        })
        .collect()
}

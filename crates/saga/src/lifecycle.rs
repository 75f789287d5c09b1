//! Order lifecycle after checkout: status transitions, cancellation with
//! compensations, refund corrections and carrier webhooks.

use chrono::Utc;
use common::OrderId;
use domain::{
    Order, OrderStatus, Refund, RefundStatus, TransitionActor, TransitionOutcome,
    map_carrier_status,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use store::Store;

use crate::discounts::DiscountEngine;
use crate::error::SagaError;
use crate::ledger::InventoryLedger;
use crate::services::{CarrierClient, Notifier, PaymentGateway, RefundSpeed};
use crate::settings::FulfillmentSettings;
use crate::timeout::with_timeout;

/// Result of a status change request.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub order: Order,
    /// False when the order already had the requested status.
    pub changed: bool,
    /// Best-effort compensations that did not complete.
    pub warnings: Vec<String>,
}

/// A status update pushed by the shipping carrier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CarrierEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub tracking_code: Option<String>,
    /// The carrier's own status text, e.g. "OUT FOR DELIVERY".
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// What a carrier webhook did to the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { status: OrderStatus },
    /// The order already had the reported status.
    Unchanged,
    /// The event was not actionable.
    Ignored { reason: String },
}

/// Moves committed orders through their lifecycle.
pub struct OrderLifecycle<S, P, C, N> {
    store: S,
    ledger: InventoryLedger<S, N>,
    discounts: DiscountEngine<S>,
    payment: P,
    carrier: C,
    timeout: Duration,
}

impl<S, P, C, N> OrderLifecycle<S, P, C, N>
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
        settings: &FulfillmentSettings,
    ) -> Self {
        Self {
            ledger: InventoryLedger::new(
                store.clone(),
                notifier,
                settings.low_stock_threshold,
                settings.external_timeout,
            ),
            discounts: DiscountEngine::new(store.clone(), settings.eligibility),
            store,
            payment,
            carrier,
            timeout: settings.external_timeout,
        }
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, SagaError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SagaError::NotFound(format!("Order {order_id} not found")))
    }

    /// Applies a status change. Cancellation runs its compensations; a return
    /// puts the goods back in stock.
    #[tracing::instrument(skip(self, info), fields(order_id = %order_id))]
    pub async fn update_status(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
        actor: TransitionActor,
        info: Option<String>,
    ) -> Result<StatusChange, SagaError> {
        if target == OrderStatus::Cancelled {
            return self.cancel(order_id, actor, info).await;
        }

        let mut order = self.get_order(order_id).await?;
        let outcome = order.transition_to(target, actor, info, Utc::now())?;
        let TransitionOutcome::Applied { from } = outcome else {
            return Ok(StatusChange {
                order,
                changed: false,
                warnings: Vec::new(),
            });
        };

        let mut warnings = Vec::new();
        if target == OrderStatus::Returned {
            warnings.extend(self.restock(&order).await);
        }

        self.store.save_order(&order).await?;
        metrics::counter!("order_transitions_total", "to" => target.as_str()).increment(1);
        tracing::info!(from = %from, to = %target, "order status changed");

        Ok(StatusChange {
            order,
            changed: true,
            warnings,
        })
    }

    /// Cancels an order.
    ///
    /// Compensations run in order: carrier cancellation, refund, discount
    /// usage reversal, restock. Each is best effort; only the final audit
    /// write can fail the call. Cancelling a cancelled order is a no-op.
    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        actor: TransitionActor,
        reason: Option<String>,
    ) -> Result<StatusChange, SagaError> {
        let mut order = self.get_order(order_id).await?;
        if order.check_transition(OrderStatus::Cancelled, actor)? == TransitionOutcome::Unchanged {
            return Ok(StatusChange {
                order,
                changed: false,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();

        if let Some(shipment) = &order.shipment {
            let cancelled = with_timeout(
                "carrier",
                self.timeout,
                self.carrier.cancel_shipment(&shipment.carrier_order_id),
            )
            .await;
            if let Err(e) = cancelled {
                tracing::warn!(error = %e, "carrier shipment not cancelled");
                warnings.push(format!("carrier cancellation failed: {e}"));
            }
        }

        if let Some(warning) = self.refund(&mut order).await {
            warnings.push(warning);
        }

        if order.discount_usage_recorded
            && let Some(code) = order.discount_code.clone()
        {
            match self.discounts.reverse_usage(&code, order.subtotal).await {
                Ok(()) => order.discount_usage_recorded = false,
                Err(e) => {
                    tracing::warn!(code = %code, error = %e, "discount usage not reversed");
                    warnings.push(format!("discount usage not reversed: {e}"));
                }
            }
        }

        warnings.extend(self.restock(&order).await);

        let from = order.status();
        order.transition_to(OrderStatus::Cancelled, actor, reason, Utc::now())?;
        self.store.save_order(&order).await?;

        metrics::counter!("order_cancellations_total").increment(1);
        metrics::counter!("order_transitions_total", "to" => OrderStatus::Cancelled.as_str())
            .increment(1);
        tracing::info!(from = %from, ?actor, warnings = warnings.len(), "order cancelled");

        Ok(StatusChange {
            order,
            changed: true,
            warnings,
        })
    }

    /// Corrects the refund status. Allowed in every state.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_refund_status(
        &self,
        order_id: &OrderId,
        status: RefundStatus,
        refund_id: Option<String>,
    ) -> Result<Order, SagaError> {
        let mut order = self.get_order(order_id).await?;
        order.set_refund_status(status, refund_id)?;
        self.store.save_order(&order).await?;
        Ok(order)
    }

    /// Applies a carrier status update.
    ///
    /// Unknown statuses, stale events and repeats of the current status leave
    /// the order untouched.
    #[tracing::instrument(
        skip(self, event),
        fields(order_id = %event.order_id, status = %event.status)
    )]
    pub async fn handle_carrier_event(
        &self,
        event: CarrierEvent,
    ) -> Result<WebhookOutcome, SagaError> {
        let Some(target) = map_carrier_status(&event.status) else {
            tracing::debug!("carrier status not mapped");
            return Ok(WebhookOutcome::Ignored {
                reason: format!("unmapped carrier status '{}'", event.status),
            });
        };

        let order = self.get_order(&event.order_id).await?;
        let known_code = order.shipment.as_ref().and_then(|s| s.tracking_code.as_deref());
        if let (Some(reported), Some(known)) = (event.tracking_code.as_deref(), known_code)
            && reported != known
        {
            tracing::warn!(reported, known, "tracking code mismatch");
            return Ok(WebhookOutcome::Ignored {
                reason: "tracking code does not match the order".to_string(),
            });
        }

        if order.status() == target {
            return Ok(WebhookOutcome::Unchanged);
        }
        if !order.status().can_transition(target, TransitionActor::Carrier) {
            tracing::warn!(current = %order.status(), reported = %target, "stale carrier event");
            return Ok(WebhookOutcome::Ignored {
                reason: format!("cannot move from {} to {}", order.status(), target),
            });
        }

        let info = event
            .description
            .or_else(|| Some(format!("Carrier reported '{}'", event.status)));
        let change = self
            .update_status(&event.order_id, target, TransitionActor::Carrier, info)
            .await?;
        Ok(if change.changed {
            WebhookOutcome::Applied { status: target }
        } else {
            WebhookOutcome::Unchanged
        })
    }

    /// Refunds an online-paid order. Returns a warning when the refund failed.
    async fn refund(&self, order: &mut Order) -> Option<String> {
        if !order.is_paid_online() {
            return None;
        }
        let payment_id = order.payment_id()?.to_string();
        let amount = order.amount;
        let notes = format!("Order {} cancelled", order.id);

        let requested = with_timeout(
            "payment",
            self.timeout,
            self.payment
                .refund(&payment_id, amount, RefundSpeed::Normal, &notes),
        )
        .await;

        match requested {
            Ok(refund_id) => {
                tracing::info!(refund_id = %refund_id, amount = %amount, "refund initiated");
                order.record_refund(Refund {
                    id: Some(refund_id),
                    status: RefundStatus::Initiated,
                    amount,
                });
                None
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    amount = %amount,
                    "refund failed, needs manual follow-up"
                );
                order.record_refund(Refund {
                    id: None,
                    status: RefundStatus::Failed,
                    amount,
                });
                Some(format!("refund failed: {e}"))
            }
        }
    }

    async fn restock(&self, order: &Order) -> Vec<String> {
        let report = self.ledger.restock(&order.items).await;
        if !report.skipped.is_empty() {
            tracing::error!(
                reconciliation_required = true,
                skipped = report.skipped.len(),
                "restock incomplete"
            );
        }
        report
            .skipped
            .into_iter()
            .map(|(key, reason)| format!("restock of {key} failed: {reason}"))
            .collect()
    }
}

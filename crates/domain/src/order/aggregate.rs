//! The order record and its lifecycle operations.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    OrderError, OrderLine, OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus, Refund,
    RefundStatus, Shipment, ShippingAddress, StatusHistoryEntry, TransitionActor,
};

/// Everything checkout knows before the order is persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub items: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    /// Required for online payment.
    pub payment: Option<PaymentDetails>,
    pub shipping_charge: Money,
    pub discount_code: Option<String>,
    pub discount_amount: Money,
    pub shipping_address: ShippingAddress,
}

/// Result of a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed and a history entry was appended.
    Applied { from: OrderStatus },
    /// The order already had the requested status.
    Unchanged,
}

/// Order record.
///
/// The status only moves through [`Order::transition_to`], which enforces the
/// state machine and appends to `status_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment: Option<PaymentDetails>,
    pub items: Vec<OrderLine>,
    pub subtotal: Money,
    pub shipping_charge: Money,
    /// Amount charged: subtotal + shipping - discount, floored at zero.
    pub amount: Money,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub discount_amount: Money,
    /// Set once the code's usage counter has been incremented for this
    /// order; only then does cancellation reverse it.
    #[serde(default)]
    pub discount_usage_recorded: bool,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub shipment: Option<Shipment>,
    #[serde(default)]
    pub refund: Option<Refund>,
    status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a Pending order with its first history entry.
    ///
    /// Verified online payments are recorded as Paid; cash on delivery stays
    /// Pending until collected.
    pub fn new(draft: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if draft.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(line) = draft.items.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                name: line.name.clone(),
            });
        }
        let payment_status = match (draft.payment_method, &draft.payment) {
            (PaymentMethod::Online, Some(_)) => PaymentStatus::Paid,
            (PaymentMethod::Online, None) => return Err(OrderError::PaymentDetailsRequired),
            (PaymentMethod::CashOnDelivery, _) => PaymentStatus::Pending,
        };

        let subtotal: Money = draft.items.iter().map(OrderLine::total).sum();
        let amount = (subtotal + draft.shipping_charge).saturating_sub(draft.discount_amount);

        Ok(Self {
            id: draft.id,
            user_id: draft.user_id,
            status: OrderStatus::Pending,
            payment_status,
            payment_method: draft.payment_method,
            payment: draft.payment,
            items: draft.items,
            subtotal,
            shipping_charge: draft.shipping_charge,
            amount,
            discount_code: draft.discount_code,
            discount_amount: draft.discount_amount,
            discount_usage_recorded: false,
            shipping_address: draft.shipping_address,
            shipment: None,
            refund: None,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                timestamp: now,
                info: Some("Order placed".to_string()),
            }],
            created_at: now,
        })
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the audit trail, oldest first.
    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    /// Returns the total number of units ordered, saturating at `u32::MAX`.
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Returns true if the order was paid through the gateway.
    pub fn is_paid_online(&self) -> bool {
        self.payment_method == PaymentMethod::Online && self.payment_status == PaymentStatus::Paid
    }

    /// Returns the gateway payment id, if any.
    pub fn payment_id(&self) -> Option<&str> {
        self.payment
            .as_ref()
            .map(|payment| payment.payment_id.as_str())
    }

    /// Checks whether `actor` may move this order to `target` without
    /// changing anything.
    pub fn check_transition(
        &self,
        target: OrderStatus,
        actor: TransitionActor,
    ) -> Result<TransitionOutcome, OrderError> {
        if self.status == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !self.status.can_transition(target, actor) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(TransitionOutcome::Applied { from: self.status })
    }

    /// Moves the order to `target`, appending one history entry.
    ///
    /// Requesting the current status is a no-op, so repeated webhook
    /// deliveries do not grow the history.
    pub fn transition_to(
        &mut self,
        target: OrderStatus,
        actor: TransitionActor,
        info: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, OrderError> {
        let outcome = self.check_transition(target, actor)?;
        if let TransitionOutcome::Applied { .. } = outcome {
            self.status = target;
            self.status_history.push(StatusHistoryEntry {
                status: target,
                timestamp: now,
                info,
            });
        }
        Ok(outcome)
    }

    /// Records the outcome of a refund request.
    pub fn record_refund(&mut self, refund: Refund) {
        self.refund = Some(refund);
    }

    /// Corrects the refund status. Allowed in every state, terminal included.
    pub fn set_refund_status(
        &mut self,
        status: RefundStatus,
        refund_id: Option<String>,
    ) -> Result<(), OrderError> {
        let refund = self.refund.as_mut().ok_or(OrderError::NoRefund)?;
        refund.status = status;
        if let Some(id) = refund_id {
            refund.id = Some(id);
        }
        Ok(())
    }
}

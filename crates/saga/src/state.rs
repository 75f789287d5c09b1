//! Checkout saga steps.

use serde::Serialize;

/// The steps of a checkout, in execution order.
///
/// ```text
/// ValidateDemand ─► VerifyPayment ─► PersistOrder ─► DeductStock       (fatal)
///   ─► RecordDiscountUsage ─► CreateShipment ─► NotifyOperators  (best effort)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    ValidateDemand,
    VerifyPayment,
    PersistOrder,
    DeductStock,
    RecordDiscountUsage,
    CreateShipment,
    NotifyOperators,
}

impl CheckoutStep {
    /// Returns true if a failure of this step aborts the checkout.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CheckoutStep::ValidateDemand
                | CheckoutStep::VerifyPayment
                | CheckoutStep::PersistOrder
                | CheckoutStep::DeductStock
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::ValidateDemand => "validate_demand",
            CheckoutStep::VerifyPayment => "verify_payment",
            CheckoutStep::PersistOrder => "persist_order",
            CheckoutStep::DeductStock => "deduct_stock",
            CheckoutStep::RecordDiscountUsage => "record_discount_usage",
            CheckoutStep::CreateShipment => "create_shipment",
            CheckoutStep::NotifyOperators => "notify_operators",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A best-effort step that failed after the order was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedStep {
    pub step: CheckoutStep,
    pub reason: String,
}

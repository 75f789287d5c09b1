//! Tunables shared by the checkout saga and the order lifecycle.

use std::time::Duration;

use domain::EligibilityPolicy;

use crate::services::ShippingPolicy;

#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    /// ISO currency code sent to the payment gateway.
    pub currency: String,
    /// Bound on every payment, carrier and notification call.
    pub external_timeout: Duration,
    /// Low-stock threshold for products that do not set their own.
    pub low_stock_threshold: i64,
    pub shipping: ShippingPolicy,
    pub eligibility: EligibilityPolicy,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            external_timeout: Duration::from_secs(5),
            low_stock_threshold: 5,
            shipping: ShippingPolicy::default(),
            eligibility: EligibilityPolicy::default(),
        }
    }
}

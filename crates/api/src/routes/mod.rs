//! HTTP route handlers.

pub mod admin;
pub mod checkout;
pub mod discounts;
pub mod observability;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod webhooks;

//! Discount codes and the eligibility rules that govern them.

mod codes;
mod rules;

pub use codes::{
    Applicability, PromoKind, PromotionalCode, ReferralCode, ReferralKind, UserEligibility,
};
pub use rules::{
    CartItem, CodeSource, CustomerHistory, DiscountCode, DiscountContext, DiscountOutcome,
    EligibilityPolicy,
};

use common::Money;
use thiserror::Error;

/// Reasons a discount code is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    #[error("Discount code '{code}' does not exist")]
    NotFound { code: String },

    #[error("Discount code '{code}' is not active")]
    Inactive { code: String },

    #[error("Discount code '{code}' has expired")]
    Expired { code: String },

    #[error("Discount code '{code}' is not valid yet")]
    NotYetValid { code: String },

    #[error("Discount code '{code}' has reached its usage limit")]
    UsageLimitReached { code: String },

    #[error("Discount code '{code}' requires a minimum order value of {minimum}")]
    BelowMinimum { code: String, minimum: Money },

    #[error("You have already used discount code '{code}' the maximum number of times")]
    PerUserLimitReached { code: String },

    #[error("Discount code '{code}' is only valid for new customers")]
    NewCustomersOnly { code: String },

    #[error("Discount code '{code}' is not applicable to items in your cart")]
    NotApplicable { code: String },
}

//! Domain layer for the storefront fulfillment engine.
//!
//! This crate holds the pure rules, with no I/O:
//! - Catalog products, variants and stock keys
//! - Demand resolution from raw cart lines into aggregated stock demand
//! - Promotional and referral discount rules
//! - The order record and its status state machine

pub mod catalog;
pub mod demand;
pub mod discount;
pub mod error;
pub mod order;

pub use catalog::{Product, StockKey, Variant};
pub use demand::{
    AggregatedDemand, DemandError, DemandResolver, RawLineItem, ResolutionStrategy, ResolvedLine,
};
pub use discount::{
    Applicability, CartItem, CodeSource, CustomerHistory, DiscountCode, DiscountContext,
    DiscountError, DiscountOutcome, EligibilityPolicy, PromoKind, PromotionalCode, ReferralCode,
    ReferralKind, UserEligibility,
};
pub use error::DomainError;
pub use order::{
    NewOrder, Order, OrderError, OrderLine, OrderStatus, PaymentDetails, PaymentMethod,
    PaymentStatus, Refund, RefundStatus, Shipment, ShippingAddress, StatusHistoryEntry,
    TransitionActor, TransitionOutcome, map_carrier_status,
};

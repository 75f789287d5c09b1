//! Checkout saga and order lifecycle for the storefront fulfillment engine.
//!
//! Checkout runs these steps in order:
//! 1. Resolve the cart, validate stock, evaluate the discount code
//! 2. Verify the payment confirmation
//! 3. Persist the order
//! 4. Deduct stock, rolling back already-applied decrements on a lost race
//! 5. Record discount usage (best effort)
//! 6. Create the carrier shipment (best effort)
//! 7. Notify operators (best effort)
//!
//! A failure in steps 1-4 leaves no order and no stock change behind. Later
//! failures are reported on the outcome as degraded steps.
//!
//! After checkout, [`OrderLifecycle`] moves orders through their statuses and
//! runs the cancellation compensations: carrier cancellation, refund,
//! discount usage reversal and restock.

pub mod compensation;
pub mod coordinator;
pub mod discounts;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod services;
pub mod settings;
pub mod state;
pub mod timeout;

pub use compensation::{FailedUndo, StockDeduction, UndoLog};
pub use coordinator::{CheckoutOutcome, CheckoutRequest, PaymentConfirmation, SagaCoordinator};
pub use discounts::DiscountEngine;
pub use error::{ErrorKind, SagaError};
pub use ledger::{InventoryLedger, RestockReport};
pub use lifecycle::{CarrierEvent, OrderLifecycle, StatusChange, WebhookOutcome};
pub use services::{
    AccessToken, CarrierClient, CarrierSession, CreatedShipment, GatewayOrder,
    InMemoryCarrier, InMemoryNotifier, InMemoryPaymentGateway, LocalTokenIssuer, Notification,
    Notifier, PaymentGateway, QuoteRequest, RecordedRefund, RefundSpeed, ShippingDesk,
    ShippingPolicy, ShippingQuote, SignatureVerifier, TokenIssuer, TrackingActivity,
    TrackingAssignment,
};
pub use settings::FulfillmentSettings;
pub use state::{CheckoutStep, DegradedStep};

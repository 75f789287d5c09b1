//! External service traits and in-memory implementations.

pub mod carrier_token;
pub mod notification;
pub mod payment;
pub mod shipping;

pub use carrier_token::{AccessToken, CarrierSession, LocalTokenIssuer, TokenIssuer};
pub use notification::{InMemoryNotifier, Notification, Notifier};
pub use payment::{
    GatewayOrder, InMemoryPaymentGateway, PaymentGateway, RecordedRefund, RefundSpeed,
    SignatureVerifier,
};
pub use shipping::{
    CarrierClient, CreatedShipment, InMemoryCarrier, QuoteRequest, ShippingDesk, ShippingPolicy,
    ShippingQuote, TrackingActivity, TrackingAssignment,
};

//! Order record, status state machine and carrier status mapping.

mod aggregate;
mod carrier_status;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order, TransitionOutcome};
pub use carrier_status::map_carrier_status;
pub use state::{OrderStatus, PaymentStatus, TransitionActor};
pub use value_objects::{
    OrderLine, PaymentDetails, PaymentMethod, Refund, RefundStatus, Shipment, ShippingAddress,
    StatusHistoryEntry,
};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A line was built with a zero quantity.
    #[error("Invalid quantity for '{name}'")]
    InvalidQuantity { name: String },

    /// Online payment without gateway identifiers.
    #[error("Payment details are required for online payment")]
    PaymentDetailsRequired,

    /// The state machine does not allow this move.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A refund status update on an order that was never refunded.
    #[error("Order has no refund to update")]
    NoRefund,
}

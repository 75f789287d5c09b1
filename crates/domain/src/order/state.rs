//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The fulfillment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► OutForDelivery ──► Delivered
///    │            │             │              │
///    └────────────┴─────────────┴──────────────┴──► Cancelled
///                               │              │
///                               └──────────────┴──► Returned
/// ```
/// Forward moves may skip steps (a carrier can report delivery without an
/// out-for-delivery scan). Cancelling after shipment needs an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    OutForDelivery,
    /// Terminal.
    Delivered,
    /// Terminal.
    Cancelled,
    /// Returned to origin by the carrier. Terminal.
    Returned,
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionActor {
    Customer,
    Admin,
    /// Admin forcing a cancellation after shipment.
    AdminOverride,
    /// Carrier webhook.
    Carrier,
}

impl OrderStatus {
    /// Position on the happy path, `None` for off-path states.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::OutForDelivery => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled | OrderStatus::Returned => None,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Returns true if the goods have not left the warehouse yet.
    pub fn is_pre_shipment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if `actor` may move an order from `self` to `to`.
    pub fn can_transition(&self, to: OrderStatus, actor: TransitionActor) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        match to {
            OrderStatus::Cancelled => match actor {
                TransitionActor::Customer | TransitionActor::Admin => self.is_pre_shipment(),
                TransitionActor::AdminOverride | TransitionActor::Carrier => true,
            },
            OrderStatus::Returned => {
                actor != TransitionActor::Customer
                    && matches!(self, OrderStatus::Shipped | OrderStatus::OutForDelivery)
            }
            _ => {
                actor != TransitionActor::Customer
                    && matches!((self.rank(), to.rank()), (Some(from), Some(target)) if target > from)
            }
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::OutForDelivery => "OutForDelivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    /// Parses a status name. "Received" and "Processed" fold into Processing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" | "received" | "processed" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "outfordelivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "returned" => Ok(OrderStatus::Returned),
            _ => Err(format!("unknown order status '{s}'")),
        }
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    use OrderStatus::*;
    use TransitionActor::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn test_happy_path_is_allowed() {
        assert!(Pending.can_transition(Processing, Admin));
        assert!(Processing.can_transition(Shipped, Carrier));
        assert!(Shipped.can_transition(OutForDelivery, Carrier));
        assert!(OutForDelivery.can_transition(Delivered, Carrier));
    }

    #[test]
    fn test_forward_skips_are_allowed() {
        assert!(Processing.can_transition(Delivered, Carrier));
        assert!(Pending.can_transition(Shipped, Admin));
    }

    #[test]
    fn test_backward_moves_are_rejected() {
        assert!(!Shipped.can_transition(Processing, Admin));
        assert!(!OutForDelivery.can_transition(Shipped, Carrier));
        assert!(!Processing.can_transition(Pending, AdminOverride));
    }

    #[test]
    fn test_customers_can_only_cancel() {
        assert!(!Pending.can_transition(Processing, Customer));
        assert!(Pending.can_transition(Cancelled, Customer));
        assert!(Processing.can_transition(Cancelled, Customer));
    }

    #[test]
    fn test_cancel_after_shipment_needs_override() {
        assert!(!Shipped.can_transition(Cancelled, Admin));
        assert!(!OutForDelivery.can_transition(Cancelled, Customer));
        assert!(Shipped.can_transition(Cancelled, AdminOverride));
        assert!(OutForDelivery.can_transition(Cancelled, Carrier));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [Delivered, Cancelled, Returned] {
            assert!(terminal.is_terminal());
            for target in [Pending, Processing, Shipped, OutForDelivery, Delivered, Cancelled] {
                assert!(!terminal.can_transition(target, AdminOverride));
            }
        }
    }

    #[test]
    fn test_returned_only_after_shipment() {
        assert!(Shipped.can_transition(Returned, Carrier));
        assert!(!Processing.can_transition(Returned, Carrier));
    }

    #[test]
    fn test_parse_folds_synonyms() {
        assert_eq!("Received".parse::<OrderStatus>().unwrap(), Processing);
        assert_eq!("processed".parse::<OrderStatus>().unwrap(), Processing);
        assert_eq!("out for delivery".parse::<OrderStatus>().unwrap(), OutForDelivery);
        assert_eq!("Out_For_Delivery".parse::<OrderStatus>().unwrap(), OutForDelivery);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for status in [Pending, Processing, Shipped, OutForDelivery, Delivered, Cancelled, Returned] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
    }
}

//! Mapping from carrier shipment statuses to internal order statuses.

use super::OrderStatus;

/// External status names (normalized) and the order status each maps to.
const CARRIER_STATUS_TABLE: &[(&str, OrderStatus)] = &[
    ("pickup scheduled", OrderStatus::Processing),
    ("pickup generated", OrderStatus::Processing),
    ("manifested", OrderStatus::Processing),
    ("picked up", OrderStatus::Shipped),
    ("shipped", OrderStatus::Shipped),
    ("in transit", OrderStatus::Shipped),
    ("reached at destination hub", OrderStatus::Shipped),
    ("out for delivery", OrderStatus::OutForDelivery),
    ("delivered", OrderStatus::Delivered),
    ("rto delivered", OrderStatus::Returned),
    ("cancelled", OrderStatus::Cancelled),
    ("canceled", OrderStatus::Cancelled),
];

fn normalize(status: &str) -> String {
    status
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Maps a carrier status string to an order status.
///
/// Returns `None` for statuses with no internal counterpart (e.g. "RTO
/// initiated"); such events are acknowledged and ignored.
pub fn map_carrier_status(external: &str) -> Option<OrderStatus> {
    let normalized = normalize(external);
    CARRIER_STATUS_TABLE
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, status)| *status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_known_statuses() {
        assert_eq!(map_carrier_status("IN TRANSIT"), Some(OrderStatus::Shipped));
        assert_eq!(
            map_carrier_status("out_for_delivery"),
            Some(OrderStatus::OutForDelivery)
        );
        assert_eq!(map_carrier_status("Delivered"), Some(OrderStatus::Delivered));
        assert_eq!(map_carrier_status("RTO Delivered"), Some(OrderStatus::Returned));
        assert_eq!(map_carrier_status("cancelled"), Some(OrderStatus::Cancelled));
    }

    #[test]
    fn test_unknown_statuses_are_ignored() {
        assert_eq!(map_carrier_status("RTO Initiated"), None);
        assert_eq!(map_carrier_status(""), None);
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(
            map_carrier_status("  out   for  delivery "),
            Some(OrderStatus::OutForDelivery)
        );
    }
}

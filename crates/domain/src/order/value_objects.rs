//! Value objects carried on an order record.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::catalog::StockKey;

use super::OrderStatus;

/// One purchased line, priced from the catalog at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub quantity: u32,
    /// Unit price.
    pub price: Money,
}

impl OrderLine {
    /// Returns the stock counter this line draws from.
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    /// Returns the line total (price × quantity).
    pub fn total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Online,
    CashOnDelivery,
}

/// Gateway identifiers of a verified online payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub gateway_order_id: String,
    pub payment_id: String,
}

/// Delivery address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

/// Carrier shipment metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub carrier_order_id: String,
    pub shipment_id: String,
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub carrier_name: Option<String>,
}

/// Refund progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Initiated,
    Processed,
    /// Needs manual follow-up.
    Failed,
}

/// Refund block on a cancelled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Gateway refund id, absent when the refund request failed.
    #[serde(default)]
    pub id: Option<String>,
    pub status: RefundStatus,
    pub amount: Money,
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub info: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let line = OrderLine {
            product_id: ProductId::new("p1"),
            variant_id: Some(VariantId::new("v1")),
            name: "Ghee 500g".into(),
            quantity: 3,
            price: Money::from_major(250),
        };
        assert_eq!(line.total(), Money::from_major(750));
        assert_eq!(line.stock_key().to_string(), "p1/v1");
    }

    #[test]
    fn test_payment_method_wire_format() {
        let json = serde_json::to_value(PaymentMethod::CashOnDelivery).unwrap();
        assert_eq!(json, serde_json::json!("cash_on_delivery"));
    }
}

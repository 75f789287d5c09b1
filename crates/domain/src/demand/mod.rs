//! Demand resolution: raw cart lines into aggregated per-counter demand.

mod resolver;
mod strategies;

pub use resolver::DemandResolver;
pub use strategies::{
    ExplicitVariantId, LabelMatch, LineIdAsVariant, ResolutionStrategy, SingleVariantShortcut,
};

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::StockKey;

/// A cart line as sent by a client.
///
/// Clients identify the purchased variant inconsistently: some send an
/// explicit variant id, some send the variant id as the line id, some send
/// only the size/weight label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineItem {
    /// The line's own id, which older clients set to the variant id.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub product_id: Option<ProductId>,

    #[serde(default)]
    pub variant_id: Option<VariantId>,

    /// Size or weight label of the chosen variant.
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub name: String,

    pub quantity: i64,
}

impl RawLineItem {
    /// Creates a line addressing a product, with no variant hints.
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: Some(product_id.into()),
            name: name.into(),
            quantity,
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<VariantId>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Name used in error messages.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.product_id
                .as_ref()
                .map(ProductId::as_str)
                .unwrap_or("unnamed item")
        } else {
            &self.name
        }
    }
}

/// A cart line with its stock counter resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    pub key: StockKey,
    pub name: String,
    pub quantity: u32,

    /// Name of the strategy that identified the variant, if any did.
    pub resolved_by: Option<&'static str>,
}

/// Deduplicated demand on one stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedDemand {
    pub key: StockKey,
    pub quantity: u32,
    pub display_name: String,
}

impl AggregatedDemand {
    pub fn new(key: StockKey, quantity: u32, display_name: impl Into<String>) -> Self {
        Self {
            key,
            quantity,
            display_name: display_name.into(),
        }
    }
}

/// Errors raised while resolving cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemandError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Item '{name}' is missing a product id")]
    MissingProductId { name: String },

    #[error("Item '{name}' has invalid quantity {quantity}")]
    InvalidQuantity { name: String, quantity: i64 },

    #[error("Total quantity of '{name}' is too large")]
    QuantityTooLarge { name: String },
}

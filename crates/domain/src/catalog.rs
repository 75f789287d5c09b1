//! Catalog products, variants and the stock counters they own.

use common::{Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};

/// One purchasable option of a product (a size or weight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,

    /// Human label such as "500g" or "XL", also used as a fallback identifier.
    pub label: String,

    /// Units on hand. Never negative.
    pub stock: i64,

    pub price: Money,
}

/// A catalog product.
///
/// A product either tracks a single base counter (`base_stock`) or a list of
/// variants, each with its own counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,

    /// Price for products without variants.
    pub price: Money,

    #[serde(default)]
    pub base_stock: Option<i64>,

    #[serde(default)]
    pub variants: Vec<Variant>,

    /// Counter level at or below which a low-stock alert fires.
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,

    /// Derived: true iff any counter is above zero.
    #[serde(default)]
    pub in_stock: bool,
}

impl Product {
    /// Creates a product tracked by a single base counter.
    pub fn simple(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
        stock: i64,
    ) -> Self {
        let mut product = Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            subcategory: None,
            price,
            base_stock: Some(stock),
            variants: Vec::new(),
            low_stock_threshold: None,
            in_stock: false,
        };
        product.in_stock = product.computed_in_stock();
        product
    }

    /// Creates a product whose stock lives on its variants.
    pub fn with_variants(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Self {
        let price = variants.first().map(|v| v.price).unwrap_or_default();
        let mut product = Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            subcategory: None,
            price,
            base_stock: None,
            variants,
            low_stock_threshold: None,
            in_stock: false,
        };
        product.in_stock = product.computed_in_stock();
        product
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Looks up a variant by id.
    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    /// Looks up a variant by id, mutably.
    pub fn variant_mut(&mut self, id: &VariantId) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| &v.id == id)
    }

    /// Finds a variant by its human label, ignoring case and surrounding whitespace.
    pub fn variant_by_label(&self, label: &str) -> Option<&Variant> {
        let wanted = label.trim();
        self.variants
            .iter()
            .find(|v| v.label.trim().eq_ignore_ascii_case(wanted))
    }

    /// Returns the counter addressed by `variant`, if it exists.
    ///
    /// `None` addresses the base counter.
    pub fn stock_for(&self, variant: Option<&VariantId>) -> Option<i64> {
        match variant {
            Some(id) => self.variant(id).map(|v| v.stock),
            None => self.base_stock,
        }
    }

    /// Returns the unit price for the addressed counter.
    pub fn unit_price(&self, variant: Option<&VariantId>) -> Option<Money> {
        match variant {
            Some(id) => self.variant(id).map(|v| v.price),
            None => Some(self.price),
        }
    }

    /// Recomputes the derived in-stock flag from the live counters.
    pub fn computed_in_stock(&self) -> bool {
        if self.has_variants() {
            self.variants.iter().any(|v| v.stock > 0)
        } else {
            self.base_stock.unwrap_or(0) > 0
        }
    }

    /// Returns the low-stock threshold, falling back to `default`.
    pub fn threshold_or(&self, default: i64) -> i64 {
        self.low_stock_threshold.unwrap_or(default)
    }
}

/// Address of a single stock counter: a product's base counter or one variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockKey {
    pub fn new(product_id: impl Into<ProductId>, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
        }
    }

    /// Key for the product's base counter.
    pub fn base(product_id: impl Into<ProductId>) -> Self {
        Self::new(product_id, None)
    }

    /// Key for one variant's counter.
    pub fn variant(product_id: impl Into<ProductId>, variant_id: impl Into<VariantId>) -> Self {
        Self::new(product_id, Some(variant_id.into()))
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => write!(f, "{}/base", self.product_id),
        }
    }
}

//! Named variant-resolution strategies, tried in order by the resolver.

use common::{ProductId, VariantId};

use super::RawLineItem;
use crate::catalog::Product;

/// One way of identifying which variant a cart line refers to.
pub trait ResolutionStrategy: Send + Sync {
    /// Stable name, recorded on the resolved line and in logs.
    fn name(&self) -> &'static str;

    /// Returns the variant this strategy identifies, or `None` to defer to
    /// the next strategy.
    ///
    /// `product` is `None` when the product is not in the catalog.
    fn resolve(
        &self,
        line: &RawLineItem,
        product_id: &ProductId,
        product: Option<&Product>,
    ) -> Option<VariantId>;
}

/// The line carries an explicit variant id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExplicitVariantId;

impl ResolutionStrategy for ExplicitVariantId {
    fn name(&self) -> &'static str {
        "explicit_variant_id"
    }

    fn resolve(
        &self,
        line: &RawLineItem,
        _product_id: &ProductId,
        _product: Option<&Product>,
    ) -> Option<VariantId> {
        line.variant_id.clone().filter(|v| !v.is_blank())
    }
}

/// The line's own id differs from its product id, so it is the variant id.
///
/// Skipped for catalog products without variants, whose lines can carry an
/// unrelated cart-row id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineIdAsVariant;

impl ResolutionStrategy for LineIdAsVariant {
    fn name(&self) -> &'static str {
        "line_id_as_variant"
    }

    fn resolve(
        &self,
        line: &RawLineItem,
        product_id: &ProductId,
        product: Option<&Product>,
    ) -> Option<VariantId> {
        if product.is_some_and(|p| !p.has_variants()) {
            return None;
        }
        let id = line.id.as_deref()?.trim();
        if id.is_empty() || id == product_id.as_str() {
            return None;
        }
        Some(VariantId::new(id))
    }
}

/// The line's size/weight label matches a variant label.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelMatch;

impl ResolutionStrategy for LabelMatch {
    fn name(&self) -> &'static str {
        "label_match"
    }

    fn resolve(
        &self,
        line: &RawLineItem,
        _product_id: &ProductId,
        product: Option<&Product>,
    ) -> Option<VariantId> {
        let label = line.label.as_deref()?;
        product?.variant_by_label(label).map(|v| v.id.clone())
    }
}

/// The product has exactly one variant, keyed by the product id itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleVariantShortcut;

impl ResolutionStrategy for SingleVariantShortcut {
    fn name(&self) -> &'static str {
        "single_variant"
    }

    fn resolve(
        &self,
        _line: &RawLineItem,
        product_id: &ProductId,
        product: Option<&Product>,
    ) -> Option<VariantId> {
        match product?.variants.as_slice() {
            [only] if only.id.is_product(product_id) => Some(only.id.clone()),
            _ => None,
        }
    }
}

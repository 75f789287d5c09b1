//! Ordered strategy chain and demand aggregation.

use std::collections::HashMap;

use common::ProductId;

use super::strategies::{
    ExplicitVariantId, LabelMatch, LineIdAsVariant, ResolutionStrategy, SingleVariantShortcut,
};
use super::{AggregatedDemand, DemandError, RawLineItem, ResolvedLine};
use crate::catalog::{Product, StockKey};

/// Resolves raw cart lines into stock demand.
///
/// Strategies are tried in order and the first match wins. A line no
/// strategy matches addresses the product's base counter.
pub struct DemandResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl DemandResolver {
    /// Creates a resolver with a custom strategy chain.
    pub fn new(strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the configured strategies, in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves a single line against the catalog.
    pub fn resolve_line(
        &self,
        line: &RawLineItem,
        products: &HashMap<ProductId, Product>,
    ) -> Result<ResolvedLine, DemandError> {
        let product_id = line
            .product_id
            .clone()
            .filter(|p| !p.is_blank())
            .ok_or_else(|| DemandError::MissingProductId {
                name: line.display_name().to_string(),
            })?;

        let quantity = u32::try_from(line.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| DemandError::InvalidQuantity {
                name: line.display_name().to_string(),
                quantity: line.quantity,
            })?;

        let product = products.get(&product_id);
        let (variant_id, resolved_by) = self
            .strategies
            .iter()
            .find_map(|s| s.resolve(line, &product_id, product).map(|v| (v, s.name())))
            .map_or((None, None), |(v, name)| (Some(v), Some(name)));

        let name = if line.name.trim().is_empty() {
            product.map_or_else(|| product_id.to_string(), |p| p.name.clone())
        } else {
            line.name.clone()
        };

        Ok(ResolvedLine {
            key: StockKey::new(product_id, variant_id),
            name,
            quantity,
            resolved_by,
        })
    }

    /// Resolves every line, failing on the first malformed one.
    ///
    /// Input is checked in full before anything is returned, so callers can
    /// reject a cart without side effects.
    pub fn resolve(
        &self,
        lines: &[RawLineItem],
        products: &HashMap<ProductId, Product>,
    ) -> Result<Vec<ResolvedLine>, DemandError> {
        if lines.is_empty() {
            return Err(DemandError::EmptyCart);
        }
        lines
            .iter()
            .map(|line| self.resolve_line(line, products))
            .collect()
    }

    /// Groups resolved lines by stock counter and sums quantities.
    ///
    /// Output order follows the first appearance of each counter. Fails if
    /// a counter's summed quantity does not fit in a `u32`.
    pub fn aggregate(lines: &[ResolvedLine]) -> Result<Vec<AggregatedDemand>, DemandError> {
        let mut index: HashMap<&StockKey, usize> = HashMap::new();
        let mut demand: Vec<AggregatedDemand> = Vec::new();

        for line in lines {
            match index.get(&line.key) {
                Some(&i) => {
                    let entry = &mut demand[i];
                    let Some(total) = entry.quantity.checked_add(line.quantity) else {
                        return Err(DemandError::QuantityTooLarge {
                            name: entry.display_name.clone(),
                        });
                    };
                    entry.quantity = total;
                }
                None => {
                    index.insert(&line.key, demand.len());
                    demand.push(AggregatedDemand::new(
                        line.key.clone(),
                        line.quantity,
                        line.name.clone(),
                    ));
                }
            }
        }
        Ok(demand)
    }
}

impl Default for DemandResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ExplicitVariantId),
            Box::new(LineIdAsVariant),
            Box::new(LabelMatch),
            Box::new(SingleVariantShortcut),
        ])
    }
}

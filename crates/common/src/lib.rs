//! Shared identifiers and value types used across the fulfillment engine.

mod money;
mod types;

pub use money::Money;
pub use types::{OrderId, ProductId, UserId, VariantId};

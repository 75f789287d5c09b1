//! Domain error types.

use thiserror::Error;

use crate::demand::DemandError;
use crate::discount::DiscountError;
use crate::order::OrderError;

/// Errors that can occur while applying domain rules.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A cart line could not be turned into stock demand.
    #[error(transparent)]
    Demand(#[from] DemandError),

    /// A discount code was rejected.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// An order rule was violated.
    #[error(transparent)]
    Order(#[from] OrderError),
}

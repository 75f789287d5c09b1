//! Saga error types.

use domain::{DemandError, DiscountError, OrderError};
use store::StoreError;
use thiserror::Error;

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ExternalService,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Persistence => "persistence",
        }
    }
}

/// Errors that can occur during checkout and order lifecycle operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// A referenced order, product or variant does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Stock ran out or the order is in the wrong state.
    #[error("{0}")]
    Conflict(String),

    /// A payment, carrier or notification call failed.
    #[error("{service} error: {reason}")]
    ExternalService {
        service: &'static str,
        reason: String,
    },

    /// A payment, carrier or notification call exceeded its time bound.
    #[error("{service} did not respond within {timeout_ms}ms")]
    Timeout {
        service: &'static str,
        timeout_ms: u64,
    },

    #[error(transparent)]
    Demand(#[from] DemandError),

    #[error(transparent)]
    Discount(#[from] DiscountError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl SagaError {
    /// Builds an external service failure.
    pub fn external(service: &'static str, reason: impl Into<String>) -> Self {
        SagaError::ExternalService {
            service,
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) | SagaError::Demand(_) => ErrorKind::Validation,
            SagaError::NotFound(_) => ErrorKind::NotFound,
            SagaError::Conflict(_) => ErrorKind::Conflict,
            SagaError::ExternalService { .. } | SagaError::Timeout { .. } => {
                ErrorKind::ExternalService
            }
            SagaError::Discount(DiscountError::NotFound { .. }) => ErrorKind::NotFound,
            SagaError::Discount(_) => ErrorKind::Validation,
            SagaError::Order(OrderError::InvalidTransition { .. }) => ErrorKind::Conflict,
            SagaError::Order(_) => ErrorKind::Validation,
            SagaError::Persistence(StoreError::Conflict(_)) => ErrorKind::Conflict,
            SagaError::Persistence(StoreError::NotFound(_)) => ErrorKind::NotFound,
            SagaError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

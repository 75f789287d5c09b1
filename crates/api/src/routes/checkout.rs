//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use saga::{CheckoutOutcome, CheckoutRequest};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// POST /checkout — run the checkout saga for a cart.
///
/// Answers 201 with the committed order and any degraded steps.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutOutcome>), ApiError> {
    let Json(request) = payload?;
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("Cart is empty".to_string()));
    }

    let outcome = state.coordinator.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

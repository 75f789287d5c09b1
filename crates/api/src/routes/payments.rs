//! Payment gateway order registration.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::Utc;
use common::Money;
use saga::GatewayOrder;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreatePaymentOrderRequest {
    /// Amount in minor units.
    pub amount: Money,
    #[serde(default)]
    pub receipt: Option<String>,
}

/// POST /payments/orders — register an order the customer will pay against.
#[tracing::instrument(skip(state, payload))]
pub async fn create_order<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreatePaymentOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GatewayOrder>), ApiError> {
    let Json(req) = payload?;
    let receipt = req
        .receipt
        .unwrap_or_else(|| format!("rcpt_{}", Utc::now().timestamp_millis()));

    let order = state
        .coordinator
        .create_payment_order(req.amount, &receipt)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

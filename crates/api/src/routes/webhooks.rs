//! Carrier webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use saga::{CarrierEvent, WebhookOutcome};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// POST /webhooks/carrier — apply a carrier status push.
///
/// Repeated deliveries of the same status answer 200 without changing the
/// order.
#[tracing::instrument(skip(state, payload))]
pub async fn carrier<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CarrierEvent>, JsonRejection>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let Json(event) = payload?;
    metrics::counter!("carrier_webhooks_total").increment(1);

    let outcome = state.lifecycle.handle_carrier_event(event).await?;
    Ok(Json(outcome))
}

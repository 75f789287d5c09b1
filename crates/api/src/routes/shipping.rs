//! Shipping quotes and tracking.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use saga::{QuoteRequest, ShippingQuote, TrackingActivity};
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct TrackingResponse {
    pub tracking_code: String,
    pub activities: Vec<TrackingActivity>,
}

/// POST /shipping/quote — carrier rate, or the flat policy when the carrier
/// is unreachable.
#[tracing::instrument(skip(state, payload))]
pub async fn quote<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<ShippingQuote>, ApiError> {
    let Json(req) = payload?;
    if req.destination_postal.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Destination postal code is required".to_string(),
        ));
    }
    if req.weight_kg.is_nan() || req.weight_kg <= 0.0 {
        return Err(ApiError::BadRequest("Weight must be positive".to_string()));
    }

    Ok(Json(state.shipping.quote(&req).await))
}

/// GET /shipping/track/{code}
#[tracing::instrument(skip(state))]
pub async fn track<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let activities = state.shipping.track(&code).await?;
    Ok(Json(TrackingResponse {
        tracking_code: code,
        activities,
    }))
}

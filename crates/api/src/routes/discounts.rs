//! Discount code preview.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use common::UserId;
use domain::{DiscountOutcome, RawLineItem};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub items: Vec<RawLineItem>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// POST /discounts/validate — evaluate a code against a cart without
/// recording any usage.
#[tracing::instrument(skip(state, payload))]
pub async fn validate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<DiscountOutcome>, ApiError> {
    let Json(req) = payload?;
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Discount code is required".to_string()));
    }

    let outcome = state
        .coordinator
        .preview_discount(&req.code, &req.items, req.user_id.as_ref())
        .await?;
    Ok(Json(outcome))
}

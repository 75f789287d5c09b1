//! Catalog and discount code seeding.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::ProductId;
use domain::{Product, PromotionalCode, ReferralCode};
use store::{CatalogStore, CodeRegistry, Store};

use crate::AppState;
use crate::error::ApiError;

fn check_stock(product: &Product) -> Result<(), ApiError> {
    let negative = product.base_stock.is_some_and(|s| s < 0)
        || product.variants.iter().any(|v| v.stock < 0);
    if negative {
        return Err(ApiError::BadRequest("Stock cannot be negative".to_string()));
    }
    Ok(())
}

/// PUT /admin/products/{id} — create or replace a product.
#[tracing::instrument(skip(state, payload))]
pub async fn upsert_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(mut product) = payload?;
    check_stock(&product)?;
    product.id = ProductId::new(id);

    state.store.upsert_product(product.clone()).await?;
    let stored = state
        .store
        .get_product(&product.id)
        .await?
        .unwrap_or(product);
    Ok(Json(stored))
}

/// PUT /admin/promo-codes
#[tracing::instrument(skip(state, payload))]
pub async fn upsert_promo_code<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PromotionalCode>, JsonRejection>,
) -> Result<Json<PromotionalCode>, ApiError> {
    let Json(mut code) = payload?;
    code.code = code.code.trim().to_uppercase();
    if code.code.is_empty() {
        return Err(ApiError::BadRequest("Code is required".to_string()));
    }

    state.store.upsert_promotional_code(code.clone()).await?;
    Ok(Json(code))
}

/// PUT /admin/referral-codes
#[tracing::instrument(skip(state, payload))]
pub async fn upsert_referral_code<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ReferralCode>, JsonRejection>,
) -> Result<Json<ReferralCode>, ApiError> {
    let Json(mut code) = payload?;
    code.code = code.code.trim().to_uppercase();
    if code.code.is_empty() {
        return Err(ApiError::BadRequest("Code is required".to_string()));
    }

    state.store.upsert_referral_code(code.clone()).await?;
    Ok(Json(code))
}

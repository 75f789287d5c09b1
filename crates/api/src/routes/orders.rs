//! Order lookup and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{Order, OrderStatus, RefundStatus, TransitionActor};
use saga::StatusChange;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    /// Target status name, e.g. "Shipped" or "out_for_delivery".
    pub status: String,
    #[serde(default)]
    pub info: Option<String>,
    /// Allows cancelling an order that has already shipped.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    #[default]
    Customer,
    Admin,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub by: Requester,
    /// Admin only: cancel after shipment.
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct RefundUpdateRequest {
    pub status: RefundStatus,
    #[serde(default)]
    pub refund_id: Option<String>,
}

fn admin_actor(force: bool) -> TransitionActor {
    if force {
        TransitionActor::AdminOverride
    } else {
        TransitionActor::Admin
    }
}

// -- Handlers --

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.lifecycle.get_order(&OrderId::new(id)).await?;
    Ok(Json(order))
}

/// POST /orders/{id}/status — admin status change.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<StatusChange>, ApiError> {
    let Json(req) = payload?;
    let target: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;

    let change = state
        .lifecycle
        .update_status(&OrderId::new(id), target, admin_actor(req.force), req.info)
        .await?;
    Ok(Json(change))
}

/// POST /orders/{id}/cancel — cancel with compensations.
#[tracing::instrument(skip(state, payload))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<StatusChange>, ApiError> {
    let Json(req) = payload?;
    let actor = match req.by {
        Requester::Customer if req.force => {
            return Err(ApiError::BadRequest(
                "Only an admin can force a cancellation".to_string(),
            ));
        }
        Requester::Customer => TransitionActor::Customer,
        Requester::Admin => admin_actor(req.force),
    };

    let change = state
        .lifecycle
        .cancel(&OrderId::new(id), actor, req.reason)
        .await?;
    Ok(Json(change))
}

/// PUT /orders/{id}/refund — correct the refund status.
#[tracing::instrument(skip(state, payload))]
pub async fn update_refund<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<RefundUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(req) = payload?;
    let order = state
        .lifecycle
        .update_refund_status(&OrderId::new(id), req.status, req.refund_id)
        .await?;
    Ok(Json(order))
}

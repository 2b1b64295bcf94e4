//! Drone arm and start endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::DeliveryStatus;
use order_store::OrderStore;
use serde::Serialize;

use super::orders::{AppState, OkResponse, parse_order_id};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ArmResponse {
    pub ok: bool,
    pub status: DeliveryStatus,
}

/// POST /orders/:id/drone/arm — move to pickup and schedule the automatic start.
#[tracing::instrument(skip(state))]
pub async fn arm<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ArmResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.delivery.arm(order_id).await?;

    Ok(Json(ArmResponse {
        ok: true,
        status: order.status(),
    }))
}

/// POST /orders/:id/drone/start — launch the drone now.
#[tracing::instrument(skip(state))]
pub async fn start<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.delivery.start(order_id).await?;

    Ok(Json(OkResponse { ok: true }))
}

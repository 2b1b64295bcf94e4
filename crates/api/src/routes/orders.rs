//! Order placement, lookup, override and deletion endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use delivery::DeliveryEngine;
use domain::{DeliveryStatus, Order, OrderError};
use order_store::OrderStore;
use saga::{OrderRequest, PaymentGateway, ProductCatalog, SagaCoordinator};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Product service handle shared by the saga and the delivery engine.
pub type SharedCatalog = Arc<dyn ProductCatalog>;

/// Payment service handle used by the saga.
pub type SharedPayment = Arc<dyn PaymentGateway>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub store: S,
    pub saga_coordinator: SagaCoordinator<S, SharedCatalog, SharedPayment>,
    pub delivery: DeliveryEngine<S, SharedCatalog>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub qty: u32,
    pub unit_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub items: Vec<OrderItemResponse>,
    pub total: f64,
    pub status: DeliveryStatus,
    pub user_email: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_lat: Option<f64>,
    pub shipping_lng: Option<f64>,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let shipping = order.shipping();
        let location = order.shipping_location();
        Self {
            id: order.id().to_string(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    qty: item.quantity,
                    unit_price: item.unit_price.as_decimal(),
                })
                .collect(),
            total: order.total().as_decimal(),
            status: order.status(),
            user_email: order.user_email().map(str::to_string),
            shipping_name: shipping.name.clone(),
            shipping_phone: shipping.phone.clone(),
            shipping_address: shipping.address.clone(),
            shipping_lat: location.map(|p| p.lat),
            shipping_lng: location.map(|p| p.lng),
            payment_method: order.payment_method().to_string(),
            transaction_id: order.transaction_id().map(str::to_string),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// -- Handlers --

/// POST /orders — run the placement saga and return the new order.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let order = state.saga_coordinator.place_order(request).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders?email= — list orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let email = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let orders = state.store.list(email).await?;

    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id — load one order.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .store
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/:id — administrative status override.
#[tracing::instrument(skip(state, body))]
pub async fn update_status<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let status: DeliveryStatus = request
        .status
        .as_deref()
        .ok_or(OrderError::EmptyStatus)?
        .parse()?;
    let order = state.delivery.force_status(order_id, status).await?;
    metrics::counter!("order_status_overrides_total").increment(1);

    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/:id — delete the order and close its event streams.
#[tracing::instrument(skip(state))]
pub async fn delete<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;

    if !state.delivery.delete(order_id).await? {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    }
    metrics::counter!("orders_deleted_total").increment(1);

    Ok(Json(OkResponse { ok: true }))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e: common::InvalidOrderId| ApiError::BadRequest(e.to_string()))
}

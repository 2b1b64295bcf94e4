//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use delivery::DeliveryError;
use domain::OrderError;
use order_store::StoreError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every error body is `{"error": message}`. Messages from validation and
/// business rules are passed through; collaborator and storage failures are
/// logged and answered with a generic message.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga execution error.
    Saga(SagaError),
    /// Delivery operation error.
    Delivery(DeliveryError),
    /// Order store error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Delivery(err) => delivery_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::Validation(_)
        | SagaError::ProductNotFound(_)
        | SagaError::InsufficientStock { .. }
        | SagaError::Order(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::PaymentFailed(source) => {
            tracing::warn!(error = %source, "payment failed");
            (StatusCode::PAYMENT_REQUIRED, "Payment failed".to_string())
        }
        SagaError::PaymentUnavailable(source) => {
            tracing::error!(error = %source, "payment service unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Payment service unavailable".to_string(),
            )
        }
        SagaError::CatalogUnavailable(source) => {
            tracing::error!(error = %source, "product service unavailable");
            (
                StatusCode::BAD_GATEWAY,
                "Product service unavailable".to_string(),
            )
        }
        SagaError::ReservationFailed { .. } => {
            tracing::error!(error = %err, "stock reservation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to reserve stock".to_string(),
            )
        }
        SagaError::Store(_) => {
            tracing::error!(error = %err, "order could not be stored");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn delivery_error_to_response(err: DeliveryError) -> (StatusCode, String) {
    match err {
        DeliveryError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DeliveryError::OverrideDisabled => (StatusCode::FORBIDDEN, err.to_string()),
        DeliveryError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        DeliveryError::Order(OrderError::InvalidTransition { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        DeliveryError::Order(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        DeliveryError::Store(store_err) => store_error_to_response(store_err),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!(error = %err, "order store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        ApiError::Delivery(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

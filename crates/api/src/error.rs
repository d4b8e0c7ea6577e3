//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use inventory::InventoryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Checkout(CheckoutError),
    Inventory(InventoryError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = match &err {
        CheckoutError::InvalidRequest(_)
        | CheckoutError::EmptyCart
        | CheckoutError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        CheckoutError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InsufficientInventory { .. }
        | CheckoutError::ReservationFailed(_)
        | CheckoutError::OrderNotCancellable { .. }
        | CheckoutError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CheckoutError::CartUnavailable(_)
        | CheckoutError::InventoryUnavailable(_)
        | CheckoutError::QuoteUnavailable(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    let status = match &err {
        InventoryError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        InventoryError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
        InventoryError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, ProductId};
    use orders::OrderStatus;

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_checkout_error_statuses() {
        assert_eq!(status_of(CheckoutError::EmptyCart.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(CheckoutError::PaymentFailed("declined".to_string()).into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(
                CheckoutError::InsufficientInventory {
                    product_ids: vec![ProductId::new("p1")]
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                CheckoutError::OrderNotCancellable {
                    order_id: OrderId::new(),
                    status: OrderStatus::Shipped
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::QuoteUnavailable("down".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CheckoutError::Persistence("disk".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_inventory_error_statuses() {
        let err = InventoryError::InvalidQuantity {
            product_id: ProductId::new("p1"),
            quantity: 0,
        };
        assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(InventoryError::Unavailable("down".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
    }
}

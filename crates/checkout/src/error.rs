use common::{OrderId, ProductId};
use inventory::InventoryError;
use orders::{OrderError, OrderLookup, OrderStatus};
use thiserror::Error;

/// A collaborator call failed before producing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} service error: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// Errors surfaced to checkout callers.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart unavailable: {0}")]
    CartUnavailable(ServiceError),

    /// The advisory check found products that cannot cover the cart.
    #[error("Insufficient inventory for products: {}", join_ids(.product_ids))]
    InsufficientInventory { product_ids: Vec<ProductId> },

    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(String),

    #[error("Failed to reserve inventory: {0}")]
    ReservationFailed(String),

    #[error("Shipping quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// Transport failure or decline.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Failed to persist order: {0}")]
    Persistence(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderLookup),

    #[error("Order {order_id} cannot be cancelled in status {status}")]
    OrderNotCancellable {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ProductId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(lookup) => CheckoutError::OrderNotFound(lookup),
            OrderError::NotCancellable { order_id, status } => {
                CheckoutError::OrderNotCancellable { order_id, status }
            }
            OrderError::InvalidTransition { order_id, from, to } => {
                CheckoutError::InvalidTransition { order_id, from, to }
            }
            OrderError::InvalidStatus(status) => CheckoutError::InvalidStatus(status),
            OrderError::InvalidOrder(reason) => CheckoutError::InvalidRequest(reason),
            other => CheckoutError::Persistence(other.to_string()),
        }
    }
}

impl From<InventoryError> for CheckoutError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock { product_ids } => {
                CheckoutError::InsufficientInventory { product_ids }
            }
            InventoryError::InvalidQuantity { .. } => {
                CheckoutError::InvalidRequest(err.to_string())
            }
            other => CheckoutError::InventoryUnavailable(other.to_string()),
        }
    }
}

use common::OrderId;
use thiserror::Error;

use crate::model::OrderLookup;
use crate::status::OrderStatus;

/// Errors that can occur when reading or writing orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No order matches the lookup for this user.
    #[error("Order not found: {0}")]
    NotFound(OrderLookup),

    /// Cancellation was requested for an order past the point of no return.
    #[error("Order {order_id} cannot be cancelled in status {status}")]
    NotCancellable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The transition policy forbids moving between these statuses.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// The order to create breaks an invariant: no items, a zero quantity,
    /// a negative amount, or totals that disagree with their lines.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The ledger could not persist the change.
    #[error("Order persistence failed: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for order ledger operations.
pub type Result<T> = std::result::Result<T, OrderError>;

use common::{ProductId, ReservationId};
use thiserror::Error;

/// Errors that can occur when interacting with the inventory ledger.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// One or more products cannot cover the requested quantity.
    /// Unknown products are reported here as well.
    #[error("Insufficient stock for products: {}", join_ids(.product_ids))]
    InsufficientStock { product_ids: Vec<ProductId> },

    /// A line asked for zero units, or more than the ledger can represent.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: u64 },

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The ledger could not be reached.
    #[error("Inventory ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ProductId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

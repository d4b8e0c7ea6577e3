//! Inventory ledger: per-product stock counters and the reservations
//! that hold stock for an order while checkout completes.
//!
//! Reservations are all-or-nothing. Rows are locked in ascending
//! product-id order, each stock count is re-read under its lock, and
//! either every line is decremented or nothing changes. A reservation
//! starts `held`, and is later `committed` once its order exists or
//! `released` (stock returned) when it expires without an order or the
//! order is cancelled.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod postgres;

pub use error::{InventoryError, Result};
pub use ledger::{InventoryLedger, merge_items};
pub use memory::InMemoryInventoryLedger;
pub use model::{
    InventoryItem, InventoryReservation, ReservationReceipt, ReservationStatus, StockCheck,
};
pub use postgres::PostgresInventoryLedger;

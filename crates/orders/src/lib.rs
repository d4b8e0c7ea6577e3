//! Order ledger: the system of record for purchase state.
//!
//! An order is written once, together with its line items and an initial
//! history entry, and afterwards changes only through status transitions.
//! Every transition appends exactly one [`OrderStatusHistory`] row in the
//! same transaction that updates the order.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod status;

pub use error::{OrderError, Result};
pub use ledger::OrderLedger;
pub use memory::InMemoryOrderLedger;
pub use model::{
    NewOrder, NewOrderItem, Order, OrderDetails, OrderItem, OrderLookup, OrderStatusHistory,
    StatusUpdate,
};
pub use postgres::PostgresOrderLedger;
pub use status::{OrderStatus, TransitionPolicy};

//! Shared identifiers and value types used across the checkout services.
//!
//! Every crate in the workspace speaks in these types: identifiers are
//! newtypes so an order id can never be passed where a user id is
//! expected, and money is always carried in minor currency units.

pub mod address;
pub mod money;
pub mod page;
pub mod types;

pub use address::Address;
pub use money::{Currency, CurrencyError, Money};
pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};
pub use types::{OrderId, ProductId, ReservationId, UserId};

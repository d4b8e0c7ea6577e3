//! Collaborator contracts the orchestrator calls, with in-memory
//! implementations for tests and the demo server.

pub mod cart;
pub mod notification;
pub mod payment;
pub mod shipping;

pub use cart::{Cart, CartLine, CartProvider, InMemoryCartProvider};
pub use notification::{
    ConfirmationLine, InMemoryNotifier, LogNotifier, Notifier, OrderConfirmation,
};
pub use payment::{
    ChargeReceipt, ChargeRequest, InMemoryPaymentGateway, PaymentGateway, RefundReceipt,
};
pub use shipping::{ShippingQuote, ShippingQuoter, StubShippingQuoter};

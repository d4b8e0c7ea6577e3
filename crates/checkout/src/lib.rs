//! Checkout orchestration.
//!
//! A checkout turns the buyer's cart into a confirmed order by calling
//! independent collaborators in a fixed order, with no shared transaction:
//!
//! 1. Validate the request
//! 2. Fetch the cart
//! 3. Check inventory
//! 4. Reserve inventory
//! 5. Quote shipping
//! 6. Compute totals
//! 7. Charge payment
//! 8. Commit the order
//! 9. Clear the cart (best effort)
//! 10. Queue the confirmation notification (best effort)
//!
//! A failure stops the sequence. Nothing is compensated automatically:
//! the returned [`CheckoutOutcome`] names the failed step and lists the
//! side effects that remain (a reservation, a captured charge). Expired
//! reservations are swept by the [`ReservationReaper`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod idempotency;
pub mod orchestrator;
pub mod reaper;
pub mod retry;
pub mod services;
pub mod step;

pub use config::CheckoutConfig;
pub use dispatcher::{DispatchError, NotificationDispatcher};
pub use error::{CheckoutError, ServiceError};
pub use idempotency::IdempotencyKeyStrategy;
pub use orchestrator::{
    CancellationOutcome, CheckoutOrchestrator, CheckoutRequest, Recipient, RefundOutcome,
};
pub use reaper::{ReservationReaper, SweepReport};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use services::{
    Cart, CartLine, CartProvider, ChargeReceipt, ChargeRequest, ConfirmationLine,
    InMemoryCartProvider, InMemoryNotifier, InMemoryPaymentGateway, LogNotifier, Notifier,
    OrderConfirmation, PaymentGateway, RefundReceipt, ShippingQuote, ShippingQuoter,
    StubShippingQuoter,
};
pub use step::{CheckoutOutcome, CheckoutStep, SideEffects, StepLog, StepRecord, StepStatus};

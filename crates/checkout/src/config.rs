use common::Address;
use orders::TransitionPolicy;

use crate::idempotency::IdempotencyKeyStrategy;

/// Tunables of the checkout orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// How long reserved stock is held before the reaper may reclaim it.
    pub reservation_ttl_minutes: u32,
    /// Package weight sent with every shipping quote request.
    pub package_weight_grams: u32,
    /// Ship-from address, if the quoter needs one.
    pub origin: Option<Address>,
    pub idempotency: IdempotencyKeyStrategy,
    /// Return reserved units to stock when an order is cancelled.
    pub restock_on_cancel: bool,
    pub transition_policy: TransitionPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_minutes: 15,
            package_weight_grams: 1000,
            origin: None,
            idempotency: IdempotencyKeyStrategy::default(),
            restock_on_cancel: true,
            transition_policy: TransitionPolicy::default(),
        }
    }
}

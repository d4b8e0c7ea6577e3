//! Payment idempotency keys.

use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::Cart;

/// How the charge idempotency key is derived for a checkout attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyKeyStrategy {
    /// `order-{user}-{subtotal_cents}`.
    ///
    /// Two distinct checkouts by the same user with equal subtotals share a
    /// key, so the second is answered with the first charge.
    LegacyUserSubtotal,
    /// `order-{order_id}`: one key per attempt.
    #[default]
    PerAttempt,
    /// `cart-{uuid}`: name-based over the user and the sorted cart lines, so
    /// retrying the same cart reuses the charge.
    CartContents,
}

impl IdempotencyKeyStrategy {
    pub fn key_for(
        &self,
        order_id: OrderId,
        user_id: UserId,
        cart: &Cart,
        subtotal: Money,
    ) -> String {
        match self {
            IdempotencyKeyStrategy::LegacyUserSubtotal => {
                format!("order-{}-{}", user_id, subtotal.cents())
            }
            IdempotencyKeyStrategy::PerAttempt => format!("order-{order_id}"),
            IdempotencyKeyStrategy::CartContents => {
                let mut lines: Vec<String> = cart
                    .lines
                    .iter()
                    .map(|l| format!("{}:{}:{}", l.product_id, l.quantity, l.unit_price.cents()))
                    .collect();
                lines.sort();
                let name = format!("{}|{}", user_id, lines.join(";"));
                format!("cart-{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyKeyStrategy::LegacyUserSubtotal => "legacy_user_subtotal",
            IdempotencyKeyStrategy::PerAttempt => "per_attempt",
            IdempotencyKeyStrategy::CartContents => "cart_contents",
        }
    }
}

impl std::str::FromStr for IdempotencyKeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "legacy_user_subtotal" => Ok(IdempotencyKeyStrategy::LegacyUserSubtotal),
            "per_attempt" => Ok(IdempotencyKeyStrategy::PerAttempt),
            "cart_contents" => Ok(IdempotencyKeyStrategy::CartContents),
            other => Err(format!("unknown idempotency key strategy: {other}")),
        }
    }
}

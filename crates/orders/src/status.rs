//! Order lifecycle.

use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// The status of an order in its lifecycle.
///
/// ```text
/// pending ──► confirmed ──► processing ──► shipped ──► delivered
///    │            │              │            │            │
///    └────────────┴──────┬───────┘            │            │
///                        ▼                    ▼            ▼
///                    cancelled ─────────► refunded ◄───────┘
/// ```
///
/// `Unspecified` is the zero value of the wire format and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Unspecified,
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Returns true if the order may still be cancelled.
    ///
    /// Once goods have left the warehouse the order can only be refunded,
    /// and an order that is already cancelled or refunded is not
    /// cancelled twice.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    /// Returns true if the strict transition table allows `self → next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Cancelled)
                | (Confirmed, Processing | Cancelled | Refunded)
                | (Processing, Shipped | Cancelled | Refunded)
                | (Shipped, Delivered | Refunded)
                | (Delivered, Refunded)
                | (Cancelled, Refunded)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unspecified => "unspecified",
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unspecified" | "" => Ok(OrderStatus::Unspecified),
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            _ => Err(OrderError::InvalidStatus(s.to_string())),
        }
    }
}

/// How `update_status` judges a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any stored status may move to any other stored status.
    #[default]
    Lenient,
    /// Only the edges of [`OrderStatus::can_transition_to`] are allowed.
    Strict,
}

impl TransitionPolicy {
    /// Returns true if the policy allows moving `from → to`.
    /// `Unspecified` is never a valid target.
    pub fn permits(&self, from: OrderStatus, to: OrderStatus) -> bool {
        if to == OrderStatus::Unspecified {
            return false;
        }
        match self {
            TransitionPolicy::Lenient => true,
            TransitionPolicy::Strict => from.can_transition_to(to),
        }
    }
}

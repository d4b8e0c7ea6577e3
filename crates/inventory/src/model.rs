//! Inventory records.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

/// A product and the number of units asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl InventoryItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Result of an advisory stock check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub available: bool,
    /// Products that cannot cover their requested quantity, in ascending order.
    pub unavailable_product_ids: Vec<ProductId>,
}

impl StockCheck {
    pub(crate) fn from_shortfalls(unavailable_product_ids: Vec<ProductId>) -> Self {
        Self {
            available: unavailable_product_ids.is_empty(),
            unavailable_product_ids,
        }
    }
}

/// Lifecycle of a reservation row.
///
/// ```text
/// held ──┬──► committed ──► released
///        └──► released
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Stock is set aside; the order may not exist yet.
    Held,
    /// The order was persisted; the units are sold.
    Committed,
    /// Stock was returned to the product.
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
        }
    }

    /// Returns true while the reserved units are still out of stock.
    pub fn holds_stock(&self) -> bool {
        matches!(self, ReservationStatus::Held | ReservationStatus::Committed)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReservationStatus::Held),
            "committed" => Ok(ReservationStatus::Committed),
            "released" => Ok(ReservationStatus::Released),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// Units of one product set aside for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl InventoryReservation {
    /// Returns true if the reservation is still held at `now` past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Held && self.expires_at <= now
    }
}

/// Everything written by one successful `reserve_inventory` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub order_id: OrderId,
    /// One row per distinct product, in ascending product-id order.
    pub reservations: Vec<InventoryReservation>,
    pub expires_at: DateTime<Utc>,
}

impl ReservationReceipt {
    pub fn reservation_ids(&self) -> Vec<ReservationId> {
        self.reservations.iter().map(|r| r.id).collect()
    }

    /// Identifier of the first reservation row, if any.
    pub fn primary_id(&self) -> Option<ReservationId> {
        self.reservations.first().map(|r| r.id)
    }

    pub fn total_units(&self) -> u64 {
        self.reservations.iter().map(|r| u64::from(r.quantity)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ReservationStatus::Held,
            ReservationStatus::Committed,
            ReservationStatus::Released,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("expired".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn only_released_returns_stock() {
        assert!(ReservationStatus::Held.holds_stock());
        assert!(ReservationStatus::Committed.holds_stock());
        assert!(!ReservationStatus::Released.holds_stock());
    }

    #[test]
    fn stock_check_available_iff_no_shortfalls() {
        assert!(StockCheck::from_shortfalls(vec![]).available);
        assert!(!StockCheck::from_shortfalls(vec![ProductId::new("p1")]).available);
    }
}

//! The inventory ledger contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};

use crate::error::{InventoryError, Result};
use crate::model::{InventoryItem, InventoryReservation, ReservationReceipt, StockCheck};

/// Storage for per-product stock and the reservations against it.
///
/// Implementations must guarantee that concurrent `reserve_inventory`
/// calls never drive a product's stock below zero.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reports which products cannot cover the requested quantities.
    ///
    /// Read-only and advisory: a positive answer does not hold any stock.
    async fn check_inventory(&self, items: &[InventoryItem]) -> Result<StockCheck>;

    /// Atomically decrements stock for every line and records one held
    /// reservation per product, expiring `expiration_minutes` from now.
    ///
    /// Fails with [`InventoryError::InsufficientStock`] without changing
    /// anything if any line is short.
    async fn reserve_inventory(
        &self,
        order_id: OrderId,
        items: &[InventoryItem],
        expiration_minutes: u32,
    ) -> Result<ReservationReceipt>;

    /// Current available units, or `None` for an unknown product.
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>>;

    /// Creates or overwrites the stock count of a product.
    async fn set_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()>;

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>>;

    /// Held reservations whose expiry is at or before `now`, oldest first.
    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>>;

    /// Returns a held reservation's units to stock.
    ///
    /// Returns `Ok(false)` if the reservation is no longer held.
    async fn release_reservation(&self, id: ReservationId) -> Result<bool>;

    /// Marks a held reservation as committed to its order.
    ///
    /// Returns `Ok(false)` if the reservation is no longer held.
    async fn commit_reservation(&self, id: ReservationId) -> Result<bool>;

    /// Releases every held or committed reservation of an order and
    /// returns the number of units put back in stock.
    async fn release_order_reservations(&self, order_id: OrderId) -> Result<u64>;
}

/// Validates quantities and merges duplicate product lines.
///
/// The returned map iterates in ascending product-id order, which is the
/// lock order every ledger uses.
pub fn merge_items(items: &[InventoryItem]) -> Result<BTreeMap<ProductId, u32>> {
    let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
    for item in items {
        if item.quantity == 0 {
            return Err(InventoryError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: 0,
            });
        }
        let entry = merged.entry(item.product_id.clone()).or_insert(0);
        let current = *entry;
        *entry = current
            .checked_add(item.quantity)
            .ok_or_else(|| InventoryError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: u64::from(current) + u64::from(item.quantity),
            })?;
    }
    Ok(merged)
}

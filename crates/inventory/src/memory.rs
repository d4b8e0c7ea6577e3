//! In-memory inventory ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, ReservationId};
use tokio::sync::Mutex;

use crate::error::{InventoryError, Result};
use crate::ledger::{InventoryLedger, merge_items};
use crate::model::{
    InventoryItem, InventoryReservation, ReservationReceipt, ReservationStatus, StockCheck,
};

#[derive(Debug)]
struct StockRow {
    quantity: u32,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    /// Each product's counter sits behind its own async mutex, the
    /// in-process equivalent of a row lock.
    stock: HashMap<ProductId, Arc<Mutex<StockRow>>>,
    reservations: HashMap<ReservationId, InventoryReservation>,
    fail_on_check: bool,
    fail_on_reserve: bool,
    check_calls: usize,
    reserve_calls: usize,
}

/// In-memory inventory ledger for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with the given stock counts.
    pub fn with_stock<P: Into<ProductId>>(stock: impl IntoIterator<Item = (P, u32)>) -> Self {
        let ledger = Self::new();
        {
            let mut state = ledger.write();
            for (product_id, quantity) in stock {
                state
                    .stock
                    .insert(product_id.into(), Arc::new(Mutex::new(StockRow { quantity })));
            }
        }
        ledger
    }

    /// Makes `check_inventory` fail as if the ledger were unreachable.
    pub fn set_fail_on_check(&self, fail: bool) {
        self.write().fail_on_check = fail;
    }

    /// Makes `reserve_inventory` fail as if the ledger were unreachable.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.write().fail_on_reserve = fail;
    }

    pub fn check_calls(&self) -> usize {
        self.read().check_calls
    }

    pub fn reserve_calls(&self) -> usize {
        self.read().reserve_calls
    }

    /// Number of reservation rows in any status.
    pub fn reservation_count(&self) -> usize {
        self.read().reservations.len()
    }

    /// Number of reservation rows in the given status.
    pub fn reservation_count_with_status(&self, status: ReservationStatus) -> usize {
        self.read()
            .reservations
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn row(&self, product_id: &ProductId) -> Option<Arc<Mutex<StockRow>>> {
        self.read().stock.get(product_id).cloned()
    }

    /// Adds units back to each product, locking rows in ascending order.
    async fn restock(&self, returned: BTreeMap<ProductId, u32>) -> u64 {
        let mut units = 0;
        for (product_id, quantity) in returned {
            if let Some(row) = self.row(&product_id) {
                let mut row = row.lock().await;
                row.quantity = row.quantity.saturating_add(quantity);
                units += u64::from(quantity);
            }
        }
        units
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn check_inventory(&self, items: &[InventoryItem]) -> Result<StockCheck> {
        let merged = merge_items(items)?;
        {
            let mut state = self.write();
            state.check_calls += 1;
            if state.fail_on_check {
                return Err(InventoryError::Unavailable(
                    "inventory check failed".to_string(),
                ));
            }
        }

        let mut short = Vec::new();
        for (product_id, wanted) in merged {
            let available = match self.row(&product_id) {
                Some(row) => row.lock().await.quantity,
                None => 0,
            };
            if available < wanted {
                short.push(product_id);
            }
        }
        Ok(StockCheck::from_shortfalls(short))
    }

    async fn reserve_inventory(
        &self,
        order_id: OrderId,
        items: &[InventoryItem],
        expiration_minutes: u32,
    ) -> Result<ReservationReceipt> {
        let merged = merge_items(items)?;
        let rows: Vec<(ProductId, Option<Arc<Mutex<StockRow>>>)> = {
            let mut state = self.write();
            state.reserve_calls += 1;
            if state.fail_on_reserve {
                return Err(InventoryError::Unavailable(
                    "inventory reservation failed".to_string(),
                ));
            }
            merged
                .keys()
                .map(|product_id| (product_id.clone(), state.stock.get(product_id).cloned()))
                .collect()
        };

        // `merged` is ordered, so rows are locked in ascending product order.
        let mut short = Vec::new();
        let mut guards = Vec::with_capacity(rows.len());
        for (product_id, row) in rows {
            match row {
                Some(row) => guards.push((product_id, row.lock_owned().await)),
                None => short.push(product_id),
            }
        }
        for (product_id, row) in &guards {
            if row.quantity < merged[product_id] {
                short.push(product_id.clone());
            }
        }
        if !short.is_empty() {
            short.sort();
            metrics::counter!("inventory_reservations_rejected_total").increment(1);
            return Err(InventoryError::InsufficientStock { product_ids: short });
        }

        let reserved_at = Utc::now();
        let expires_at = reserved_at + Duration::minutes(i64::from(expiration_minutes));
        let mut reservations = Vec::with_capacity(guards.len());
        for (product_id, row) in guards.iter_mut() {
            let quantity = merged[&*product_id];
            row.quantity -= quantity;
            reservations.push(InventoryReservation {
                id: ReservationId::new(),
                order_id,
                product_id: product_id.clone(),
                quantity,
                status: ReservationStatus::Held,
                reserved_at,
                expires_at,
                settled_at: None,
            });
        }

        {
            let mut state = self.write();
            for reservation in &reservations {
                state.reservations.insert(reservation.id, reservation.clone());
            }
        }
        drop(guards);

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::debug!(%order_id, rows = reservations.len(), "inventory reserved");
        Ok(ReservationReceipt {
            order_id,
            reservations,
            expires_at,
        })
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        match self.row(product_id) {
            Some(row) => Ok(Some(row.lock().await.quantity)),
            None => Ok(None),
        }
    }

    async fn set_stock(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let row = {
            let mut state = self.write();
            state
                .stock
                .entry(product_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(StockRow { quantity: 0 })))
                .clone()
        };
        row.lock().await.quantity = quantity;
        Ok(())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        let mut found: Vec<InventoryReservation> = self
            .read()
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(found)
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>> {
        let mut expired: Vec<InventoryReservation> = self
            .read()
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        Ok(expired)
    }

    async fn release_reservation(&self, id: ReservationId) -> Result<bool> {
        let returned = {
            let mut guard = self.write();
            let reservation = guard
                .reservations
                .get_mut(&id)
                .ok_or(InventoryError::ReservationNotFound(id))?;
            if reservation.status != ReservationStatus::Held {
                return Ok(false);
            }
            reservation.status = ReservationStatus::Released;
            reservation.settled_at = Some(Utc::now());
            BTreeMap::from([(reservation.product_id.clone(), reservation.quantity)])
        };
        self.restock(returned).await;
        Ok(true)
    }

    async fn commit_reservation(&self, id: ReservationId) -> Result<bool> {
        let mut state = self.write();
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or(InventoryError::ReservationNotFound(id))?;
        if reservation.status != ReservationStatus::Held {
            return Ok(false);
        }
        reservation.status = ReservationStatus::Committed;
        reservation.settled_at = Some(Utc::now());
        Ok(true)
    }

    async fn release_order_reservations(&self, order_id: OrderId) -> Result<u64> {
        let returned = {
            let mut state = self.write();
            let now = Utc::now();
            let mut returned: BTreeMap<ProductId, u32> = BTreeMap::new();
            for reservation in state
                .reservations
                .values_mut()
                .filter(|r| r.order_id == order_id && r.status.holds_stock())
            {
                reservation.status = ReservationStatus::Released;
                reservation.settled_at = Some(now);
                let entry = returned.entry(reservation.product_id.clone()).or_insert(0);
                *entry = entry.saturating_add(reservation.quantity);
            }
            returned
        };
        Ok(self.restock(returned).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryInventoryLedger {
        InMemoryInventoryLedger::with_stock([("p1", 5), ("p2", 3)])
    }

    async fn stock(ledger: &InMemoryInventoryLedger, product: &str) -> u32 {
        ledger
            .stock_level(&ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_decrements_stock() {
        let ledger = ledger();
        let order_id = OrderId::new();

        let receipt = ledger
            .reserve_inventory(order_id, &[InventoryItem::new("p1", 2)], 15)
            .await
            .unwrap();

        assert_eq!(receipt.order_id, order_id);
        assert_eq!(receipt.reservations.len(), 1);
        assert_eq!(receipt.total_units(), 2);
        assert_eq!(receipt.reservations[0].status, ReservationStatus::Held);
        assert_eq!(
            receipt.expires_at - receipt.reservations[0].reserved_at,
            Duration::minutes(15)
        );
        assert_eq!(stock(&ledger, "p1").await, 3);
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let ledger = ledger();

        let err = ledger
            .reserve_inventory(
                OrderId::new(),
                &[InventoryItem::new("p1", 1), InventoryItem::new("p2", 4)],
                15,
            )
            .await
            .unwrap_err();

        match err {
            InventoryError::InsufficientStock { product_ids } => {
                assert_eq!(product_ids, vec![ProductId::new("p2")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stock(&ledger, "p1").await, 5);
        assert_eq!(stock(&ledger, "p2").await, 3);
        assert_eq!(ledger.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product_is_short() {
        let ledger = ledger();
        let items = [InventoryItem::new("ghost", 1), InventoryItem::new("p1", 1)];

        let check = ledger.check_inventory(&items).await.unwrap();
        assert!(!check.available);
        assert_eq!(check.unavailable_product_ids, vec![ProductId::new("ghost")]);

        let err = ledger
            .reserve_inventory(OrderId::new(), &items, 15)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let ledger = ledger();
        let items = [InventoryItem::new("p1", 3), InventoryItem::new("p1", 3)];

        let check = ledger.check_inventory(&items).await.unwrap();
        assert!(!check.available);

        let receipt = ledger
            .reserve_inventory(OrderId::new(), &items[..1], 15)
            .await
            .unwrap();
        assert_eq!(receipt.reservations.len(), 1);
        assert_eq!(stock(&ledger, "p1").await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let ledger = InMemoryInventoryLedger::with_stock([("p1", 5)]);

        let attempts = (0..20).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 1)], 15)
                    .await
            })
        });
        let results = futures_util::future::join_all(attempts).await;

        let succeeded = results
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(succeeded, 5);
        assert_eq!(stock(&ledger, "p1").await, 0);
        assert_eq!(ledger.reservation_count(), 5);
    }

    #[tokio::test]
    async fn test_release_returns_stock_once() {
        let ledger = ledger();
        let receipt = ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 2)], 15)
            .await
            .unwrap();
        let id = receipt.primary_id().unwrap();

        assert!(ledger.release_reservation(id).await.unwrap());
        assert!(!ledger.release_reservation(id).await.unwrap());
        assert_eq!(stock(&ledger, "p1").await, 5);
    }

    #[tokio::test]
    async fn test_committed_reservation_is_not_released_by_id() {
        let ledger = ledger();
        let receipt = ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 2)], 15)
            .await
            .unwrap();
        let id = receipt.primary_id().unwrap();

        assert!(ledger.commit_reservation(id).await.unwrap());
        assert!(!ledger.release_reservation(id).await.unwrap());
        assert_eq!(stock(&ledger, "p1").await, 3);
    }

    #[tokio::test]
    async fn test_release_order_reservations_restocks_everything() {
        let ledger = ledger();
        let order_id = OrderId::new();
        let receipt = ledger
            .reserve_inventory(
                order_id,
                &[InventoryItem::new("p1", 2), InventoryItem::new("p2", 1)],
                15,
            )
            .await
            .unwrap();
        ledger
            .commit_reservation(receipt.reservations[0].id)
            .await
            .unwrap();

        let units = ledger.release_order_reservations(order_id).await.unwrap();

        assert_eq!(units, 3);
        assert_eq!(stock(&ledger, "p1").await, 5);
        assert_eq!(stock(&ledger, "p2").await, 3);
        assert_eq!(ledger.release_order_reservations(order_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_reservations_only_lists_held() {
        let ledger = ledger();
        let first = ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 1)], 0)
            .await
            .unwrap();
        let second = ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p2", 1)], 0)
            .await
            .unwrap();
        ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 1)], 60)
            .await
            .unwrap();
        ledger
            .commit_reservation(second.primary_id().unwrap())
            .await
            .unwrap();

        let expired = ledger
            .expired_reservations(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, first.primary_id().unwrap());
    }

    #[tokio::test]
    async fn test_release_unknown_reservation() {
        let ledger = ledger();
        let err = ledger
            .release_reservation(ReservationId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ReservationNotFound(_)));
    }

    #[tokio::test]
    async fn test_fail_toggles_count_calls() {
        let ledger = ledger();
        ledger.set_fail_on_reserve(true);

        let result = ledger
            .reserve_inventory(OrderId::new(), &[InventoryItem::new("p1", 1)], 15)
            .await;

        assert!(matches!(result, Err(InventoryError::Unavailable(_))));
        assert_eq!(ledger.reserve_calls(), 1);
        assert_eq!(ledger.check_calls(), 0);
        assert_eq!(stock(&ledger, "p1").await, 5);
    }

    #[tokio::test]
    async fn test_set_stock_creates_and_overwrites() {
        let ledger = InMemoryInventoryLedger::new();
        let product = ProductId::new("p9");

        assert_eq!(ledger.stock_level(&product).await.unwrap(), None);
        ledger.set_stock(&product, 7).await.unwrap();
        ledger.set_stock(&product, 4).await.unwrap();
        assert_eq!(ledger.stock_level(&product).await.unwrap(), Some(4));
    }
}

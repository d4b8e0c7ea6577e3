//! In-memory order ledger.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, Page, PageRequest, UserId};

use crate::error::{OrderError, Result};
use crate::ledger::OrderLedger;
use crate::model::{NewOrder, Order, OrderDetails, OrderLookup, OrderStatusHistory, StatusUpdate};
use crate::status::{OrderStatus, TransitionPolicy};

#[derive(Debug)]
struct StoredOrder {
    details: OrderDetails,
    /// Insertion sequence, breaks ties between equal creation timestamps.
    seq: u64,
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, StoredOrder>,
    next_seq: u64,
    next_history_id: i64,
    fail_on_create: bool,
    create_calls: usize,
}

impl InMemoryOrderState {
    fn next_history_id(&mut self) -> i64 {
        self.next_history_id += 1;
        self.next_history_id
    }

    fn tracking_number_taken(&self, order_id: OrderId, tracking_number: &str) -> bool {
        self.orders.values().any(|stored| {
            stored.details.order.id != order_id
                && stored.details.order.tracking_number.as_deref() == Some(tracking_number)
        })
    }

    fn apply(&mut self, order_id: OrderId, update: StatusUpdate) -> Result<Order> {
        if let Some(tn) = update.tracking_number.as_deref()
            && self.tracking_number_taken(order_id, tn)
        {
            return Err(OrderError::InvalidOrder(format!(
                "tracking number {tn} is already assigned"
            )));
        }

        let history_id = self.next_history_id();
        let stored = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(OrderLookup::Id(order_id)))?;
        let now = Utc::now();
        let details = &mut stored.details;

        details.order.status = update.status;
        details.order.updated_at = now;
        if let Some(tn) = update.tracking_number {
            details.order.tracking_number = Some(tn);
        }
        details.history.push(OrderStatusHistory {
            id: history_id,
            order_id,
            status: update.status,
            note: update.note,
            created_at: now,
        });
        Ok(details.order.clone())
    }
}

/// In-memory order ledger for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderLedger {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_order` fail as if the database rejected the write.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    pub fn create_calls(&self) -> usize {
        self.read().create_calls
    }

    /// Number of stored orders.
    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryOrderState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryOrderState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn create_order(&self, order: NewOrder) -> Result<OrderDetails> {
        order.validate()?;

        let mut state = self.write();
        state.create_calls += 1;
        if state.fail_on_create {
            return Err(OrderError::Persistence(
                "order store rejected the write".to_string(),
            ));
        }
        if state.orders.contains_key(&order.id) {
            return Err(OrderError::AlreadyExists(order.id));
        }

        let history_id = state.next_history_id();
        let (order, items, history) = order.into_records(Utc::now(), history_id);
        let details = OrderDetails {
            order,
            items,
            history: vec![history],
        };

        state.next_seq += 1;
        let seq = state.next_seq;
        state.orders.insert(
            details.order.id,
            StoredOrder {
                details: details.clone(),
                seq,
            },
        );
        Ok(details)
    }

    async fn get_order(&self, lookup: &OrderLookup, user_id: UserId) -> Result<OrderDetails> {
        let state = self.read();
        let found = match lookup {
            OrderLookup::Id(id) => state.orders.get(id),
            OrderLookup::TrackingNumber(tn) => state
                .orders
                .values()
                .find(|s| s.details.order.tracking_number.as_deref() == Some(tn.as_str())),
        };

        found
            .filter(|s| s.details.order.user_id == user_id)
            .map(|s| s.details.clone())
            .ok_or_else(|| OrderError::NotFound(lookup.clone()))
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .read()
            .orders
            .get(&order_id)
            .map(|s| s.details.order.clone()))
    }

    async fn list_orders(
        &self,
        user_id: UserId,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>> {
        let state = self.read();
        let mut matching: Vec<&StoredOrder> = state
            .orders
            .values()
            .filter(|s| s.details.order.user_id == user_id)
            .filter(|s| status.is_none_or(|wanted| s.details.order.status == wanted))
            .collect();
        matching.sort_by(|a, b| {
            b.details
                .order
                .created_at
                .cmp(&a.details.order.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .map(|s| s.details.order.clone())
            .collect();
        Ok(Page::new(items, page, total))
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
        policy: TransitionPolicy,
    ) -> Result<Order> {
        if update.status == OrderStatus::Unspecified {
            return Err(OrderError::InvalidStatus(update.status.to_string()));
        }

        let mut state = self.write();
        let current = state
            .orders
            .get(&order_id)
            .map(|s| s.details.order.status)
            .ok_or(OrderError::NotFound(OrderLookup::Id(order_id)))?;
        if !policy.permits(current, update.status) {
            return Err(OrderError::InvalidTransition {
                order_id,
                from: current,
                to: update.status,
            });
        }
        state.apply(order_id, update)
    }

    async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<Order> {
        let mut state = self.write();
        let current = state
            .orders
            .get(&order_id)
            .filter(|s| s.details.order.user_id == user_id)
            .map(|s| s.details.order.status)
            .ok_or(OrderError::NotFound(OrderLookup::Id(order_id)))?;
        if !current.is_cancellable() {
            return Err(OrderError::NotCancellable {
                order_id,
                status: current,
            });
        }
        state.apply(order_id, StatusUpdate::new(OrderStatus::Cancelled, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::new_order;

    async fn create(ledger: &InMemoryOrderLedger, user_id: UserId) -> OrderDetails {
        ledger.create_order(new_order(user_id)).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_order_items_and_history() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();

        let details = create(&ledger, user_id).await;

        assert_eq!(details.order.status, OrderStatus::Confirmed);
        assert_eq!(details.items.len(), 2);
        assert_eq!(details.history.len(), 1);
        assert_eq!(details.history[0].note, "Order created");

        let loaded = ledger
            .get_order(&OrderLookup::Id(details.order.id), user_id)
            .await
            .unwrap();
        assert_eq!(loaded, details);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let ledger = InMemoryOrderLedger::new();
        let order = new_order(UserId::new());

        ledger.create_order(order.clone()).await.unwrap();
        let err = ledger.create_order(order).await.unwrap_err();

        assert!(matches!(err, OrderError::AlreadyExists(_)));
        assert_eq!(ledger.order_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_inconsistent_line_totals() {
        let ledger = InMemoryOrderLedger::new();
        let mut order = new_order(UserId::new());
        order.items[1].line_total = common::Money::from_cents(1);

        let err = ledger.create_order(order).await.unwrap_err();

        assert!(matches!(err, OrderError::InvalidOrder(_)));
        assert_eq!(ledger.order_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let ledger = InMemoryOrderLedger::new();
        ledger.set_fail_on_create(true);

        let err = ledger.create_order(new_order(UserId::new())).await.unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert_eq!(ledger.order_count(), 0);
        assert_eq!(ledger.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_order_is_scoped_to_owner() {
        let ledger = InMemoryOrderLedger::new();
        let details = create(&ledger, UserId::new()).await;

        let err = ledger
            .get_order(&OrderLookup::Id(details.order.id), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_by_tracking_number() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();
        let details = create(&ledger, user_id).await;

        ledger
            .update_status(
                details.order.id,
                StatusUpdate::new(OrderStatus::Shipped, "handed to carrier")
                    .with_tracking_number("1Z999"),
                TransitionPolicy::Lenient,
            )
            .await
            .unwrap();

        let found = ledger
            .get_order(&OrderLookup::TrackingNumber("1Z999".to_string()), user_id)
            .await
            .unwrap();
        assert_eq!(found.order.id, details.order.id);
        assert_eq!(found.history.len(), 2);
    }

    #[tokio::test]
    async fn test_tracking_numbers_are_unique() {
        let ledger = InMemoryOrderLedger::new();
        let first = create(&ledger, UserId::new()).await;
        let second = create(&ledger, UserId::new()).await;
        let shipped =
            |tn: &str| StatusUpdate::new(OrderStatus::Shipped, "").with_tracking_number(tn);

        ledger
            .update_status(first.order.id, shipped("TN1"), TransitionPolicy::Lenient)
            .await
            .unwrap();
        let err = ledger
            .update_status(second.order.id, shipped("TN1"), TransitionPolicy::Lenient)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidOrder(_)));
    }

    #[tokio::test]
    async fn test_update_status_appends_history() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();
        let details = create(&ledger, user_id).await;

        let updated = ledger
            .update_status(
                details.order.id,
                StatusUpdate::new(OrderStatus::Processing, "picking"),
                TransitionPolicy::Strict,
            )
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Processing);
        assert!(updated.updated_at >= details.order.updated_at);

        let loaded = ledger
            .get_order(&details.order.id.into(), user_id)
            .await
            .unwrap();
        let statuses: Vec<OrderStatus> = loaded.history.iter().map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Confirmed, OrderStatus::Processing]
        );
        assert!(loaded.history[0].id < loaded.history[1].id);
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_illegal_edge() {
        let ledger = InMemoryOrderLedger::new();
        let details = create(&ledger, UserId::new()).await;

        let err = ledger
            .update_status(
                details.order.id,
                StatusUpdate::new(OrderStatus::Delivered, ""),
                TransitionPolicy::Strict,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Confirmed,
                to: OrderStatus::Delivered,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_rejects_unspecified_and_unknown() {
        let ledger = InMemoryOrderLedger::new();
        let details = create(&ledger, UserId::new()).await;

        let err = ledger
            .update_status(
                details.order.id,
                StatusUpdate::new(OrderStatus::Unspecified, ""),
                TransitionPolicy::Lenient,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatus(_)));

        let err = ledger
            .update_status(
                OrderId::new(),
                StatusUpdate::new(OrderStatus::Shipped, ""),
                TransitionPolicy::Lenient,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_rejects_shipped_without_writing() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();
        let details = create(&ledger, user_id).await;
        ledger
            .update_status(
                details.order.id,
                StatusUpdate::new(OrderStatus::Shipped, ""),
                TransitionPolicy::Lenient,
            )
            .await
            .unwrap();

        let err = ledger
            .cancel_order(details.order.id, user_id, "changed my mind")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::NotCancellable {
                status: OrderStatus::Shipped,
                ..
            }
        ));
        let loaded = ledger
            .get_order(&details.order.id.into(), user_id)
            .await
            .unwrap();
        assert_eq!(loaded.history.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_rejected() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();
        let details = create(&ledger, user_id).await;

        let cancelled = ledger
            .cancel_order(details.order.id, user_id, "duplicate")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let err = ledger
            .cancel_order(details.order.id, user_id, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotCancellable { .. }));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_with_filter() {
        let ledger = InMemoryOrderLedger::new();
        let user_id = UserId::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(create(&ledger, user_id).await.order.id);
        }
        create(&ledger, UserId::new()).await;
        ledger.cancel_order(ids[0], user_id, "").await.unwrap();

        let page = ledger
            .list_orders(user_id, PageRequest::new(1, 2), None)
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.total_pages, 2);
        let listed: Vec<OrderId> = page.items.iter().map(|o| o.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);

        let cancelled = ledger
            .list_orders(user_id, PageRequest::default(), Some(OrderStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(cancelled.total_count, 1);
        assert_eq!(cancelled.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_order_exists() {
        let ledger = InMemoryOrderLedger::new();
        let details = create(&ledger, UserId::new()).await;

        assert!(ledger.order_exists(details.order.id).await.unwrap());
        assert!(!ledger.order_exists(OrderId::new()).await.unwrap());
    }
}

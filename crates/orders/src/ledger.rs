use async_trait::async_trait;
use common::{OrderId, Page, PageRequest, UserId};

use crate::error::Result;
use crate::model::{NewOrder, Order, OrderDetails, OrderLookup, StatusUpdate};
use crate::status::{OrderStatus, TransitionPolicy};

/// Durable storage for orders.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Writes the order, its items and its initial history row in one
    /// transaction.
    async fn create_order(&self, order: NewOrder) -> Result<OrderDetails>;

    /// Loads an order with items and history, scoped to its owner.
    ///
    /// An order owned by someone else is reported as not found.
    async fn get_order(&self, lookup: &OrderLookup, user_id: UserId) -> Result<OrderDetails>;

    /// Loads an order header regardless of owner.
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_orders(
        &self,
        user_id: UserId,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>>;

    /// Applies a status change under `policy`, appending one history row.
    async fn update_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
        policy: TransitionPolicy,
    ) -> Result<Order>;

    /// Moves a cancellable order owned by `user_id` to `cancelled`.
    ///
    /// The cancellability check and the write happen atomically, so two
    /// racing cancellations cannot both succeed.
    async fn cancel_order(&self, order_id: OrderId, user_id: UserId, reason: &str)
    -> Result<Order>;

    async fn order_exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.find_order(order_id).await?.is_some())
    }
}

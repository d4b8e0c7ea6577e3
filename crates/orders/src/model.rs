//! Order records.

use chrono::{DateTime, Utc};
use common::{Address, Currency, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrderError, Result};
use crate::status::OrderStatus;

/// Order aggregate root.
///
/// All money fields are in the order's single `currency`, and
/// `total == subtotal + shipping + tax` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub currency: Currency,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub shipping_address: Address,
    pub payment_method_id: Option<String>,
    pub transaction_id: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchased line, frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product name as it was when the order was placed.
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// One append-only entry of an order's status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    /// Monotonic sequence number; history is returned in this order.
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// An order with its items and full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusHistory>,
}

/// A line to be written with a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl NewOrderItem {
    /// Creates a line whose total is `unit_price × quantity`.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            line_total: unit_price.multiply(quantity),
        }
    }
}

/// Everything needed to write an order, its items and its first history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub currency: Currency,
    pub items: Vec<NewOrderItem>,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub shipping_address: Address,
    pub payment_method_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Note of the initial history entry.
    pub note: String,
}

impl NewOrder {
    /// `subtotal + shipping + tax`. Call [`NewOrder::validate`] first; it
    /// rejects amounts whose sum overflows.
    pub fn total(&self) -> Money {
        self.subtotal + self.shipping + self.tax
    }

    /// Checks the invariants every stored order must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.status == OrderStatus::Unspecified {
            return Err(OrderError::InvalidStatus(self.status.to_string()));
        }
        if self.items.is_empty() {
            return Err(OrderError::InvalidOrder("order has no items".to_string()));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidOrder(format!(
                "item {} has zero quantity",
                item.product_id
            )));
        }
        if [self.subtotal, self.shipping, self.tax]
            .iter()
            .any(Money::is_negative)
        {
            return Err(OrderError::InvalidOrder(
                "amounts must not be negative".to_string(),
            ));
        }
        for item in &self.items {
            if item.unit_price.checked_multiply(item.quantity) != Some(item.line_total) {
                return Err(OrderError::InvalidOrder(format!(
                    "item {} line total {} is not {} x {}",
                    item.product_id, item.line_total, item.unit_price, item.quantity
                )));
            }
        }
        let line_sum = Money::checked_sum(self.items.iter().map(|i| i.line_total));
        if line_sum != Some(self.subtotal) {
            return Err(OrderError::InvalidOrder(format!(
                "subtotal {} does not match the sum of line totals",
                self.subtotal
            )));
        }
        let total = self
            .subtotal
            .checked_add(self.shipping)
            .and_then(|t| t.checked_add(self.tax));
        if total.is_none() {
            return Err(OrderError::InvalidOrder("order total is out of range".to_string()));
        }
        Ok(())
    }

    /// Materializes the stored order, its items and its first history row.
    pub(crate) fn into_records(
        self,
        now: DateTime<Utc>,
        history_id: i64,
    ) -> (Order, Vec<OrderItem>, OrderStatusHistory) {
        let total = self.total();
        let items = self
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                order_id: self.id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect();
        let history = OrderStatusHistory {
            id: history_id,
            order_id: self.id,
            status: self.status,
            note: self.note,
            created_at: now,
        };
        let order = Order {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            currency: self.currency,
            subtotal: self.subtotal,
            shipping: self.shipping,
            tax: self.tax,
            total,
            shipping_address: self.shipping_address,
            payment_method_id: self.payment_method_id,
            transaction_id: self.transaction_id,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        };
        (order, items, history)
    }
}

/// How a caller identifies the order it wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLookup {
    Id(OrderId),
    TrackingNumber(String),
}

impl std::fmt::Display for OrderLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderLookup::Id(id) => write!(f, "{id}"),
            OrderLookup::TrackingNumber(tn) => write!(f, "tracking number {tn}"),
        }
    }
}

impl From<OrderId> for OrderLookup {
    fn from(id: OrderId) -> Self {
        OrderLookup::Id(id)
    }
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: String,
    /// Attached to the order when present, typically on `shipped`.
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            note: note.into(),
            tracking_number: None,
        }
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::new_order;
    use super::*;

    #[test]
    fn test_total_is_sum_of_parts() {
        let order = new_order(UserId::new());
        assert_eq!(order.total(), Money::from_cents(1849));
    }

    #[test]
    fn test_line_total_from_unit_price() {
        let item = NewOrderItem::new("p1", "Widget", 3, Money::from_cents(1000));
        assert_eq!(item.line_total, Money::from_cents(3000));
    }

    #[test]
    fn test_validate_rejects_empty_and_zero_quantity() {
        let mut order = new_order(UserId::new());
        order.items[1].quantity = 0;
        assert!(matches!(order.validate(), Err(OrderError::InvalidOrder(_))));

        order.items.clear();
        assert!(matches!(order.validate(), Err(OrderError::InvalidOrder(_))));
    }

    #[test]
    fn test_validate_accepts_consistent_order() {
        assert!(new_order(UserId::new()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inconsistent_line_total() {
        let mut order = new_order(UserId::new());
        order.items[0].line_total = Money::from_cents(999);
        order.subtotal = Money::from_cents(1249);

        let err = order.validate().unwrap_err();
        assert!(matches!(err, OrderError::InvalidOrder(ref msg) if msg.contains("p1")));
    }

    #[test]
    fn test_validate_rejects_subtotal_mismatch() {
        let mut order = new_order(UserId::new());
        order.subtotal = Money::from_cents(1);

        assert!(matches!(order.validate(), Err(OrderError::InvalidOrder(_))));
    }

    #[test]
    fn test_validate_rejects_overflowing_amounts() {
        let mut order = new_order(UserId::new());
        order.items = vec![NewOrderItem::new("p1", "Widget", 2, Money::from_cents(i64::MAX))];
        order.subtotal = order.items[0].line_total;
        assert!(matches!(order.validate(), Err(OrderError::InvalidOrder(_))));

        let mut order = new_order(UserId::new());
        order.shipping = Money::from_cents(i64::MAX);
        assert!(matches!(order.validate(), Err(OrderError::InvalidOrder(_))));
    }

    #[test]
    fn test_validate_rejects_unspecified_status() {
        let mut order = new_order(UserId::new());
        order.status = OrderStatus::Unspecified;
        assert!(matches!(order.validate(), Err(OrderError::InvalidStatus(_))));
    }

    #[test]
    fn test_into_records_keeps_total_invariant() {
        let new = new_order(UserId::new());
        let id = new.id;
        let (order, items, history) = new.into_records(Utc::now(), 1);

        assert_eq!(order.total, order.subtotal + order.shipping + order.tax);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.order_id == id));
        assert_eq!(history.status, OrderStatus::Confirmed);
        assert_eq!(history.note, "Order created");
        assert_eq!(order.tracking_number, None);
    }

    #[test]
    fn test_lookup_display() {
        let lookup = OrderLookup::TrackingNumber("1Z999".to_string());
        assert_eq!(lookup.to_string(), "tracking number 1Z999");
    }
}

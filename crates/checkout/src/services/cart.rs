use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{Currency, Money, ProductId, UserId};
use inventory::InventoryItem;
use orders::NewOrderItem;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One product in a cart, priced at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
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
        }
    }

    /// `unit_price × quantity`; `None` when it does not fit in cents.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub currency: Currency,
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Creates a cart priced in USD.
    pub fn new(user_id: UserId, lines: Vec<CartLine>) -> Self {
        Self {
            user_id,
            currency: Currency::usd(),
            lines,
        }
    }

    pub fn empty(user_id: UserId) -> Self {
        Self::new(user_id, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of the line totals; `None` on overflow.
    pub fn total(&self) -> Option<Money> {
        self.lines
            .iter()
            .map(CartLine::line_total)
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
    }

    pub fn inventory_items(&self) -> Vec<InventoryItem> {
        self.lines
            .iter()
            .map(|l| InventoryItem::new(l.product_id.clone(), l.quantity))
            .collect()
    }

    pub fn order_items(&self) -> Vec<NewOrderItem> {
        self.lines
            .iter()
            .map(|l| {
                NewOrderItem::new(
                    l.product_id.clone(),
                    l.product_name.clone(),
                    l.quantity,
                    l.unit_price,
                )
            })
            .collect()
    }
}

/// Source of the buyer's cart.
#[async_trait]
pub trait CartProvider: Send + Sync {
    /// Returns the user's cart; a user without one gets an empty cart.
    async fn get_cart(&self, user_id: UserId) -> Result<Cart, ServiceError>;

    async fn clear_cart(&self, user_id: UserId) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Cart>,
    fail_on_get: bool,
    fail_on_clear: bool,
    get_calls: usize,
    clear_calls: usize,
}

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartProvider {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the user's cart.
    pub fn put_cart(&self, cart: Cart) {
        self.write().carts.insert(cart.user_id, cart);
    }

    pub fn cart(&self, user_id: UserId) -> Option<Cart> {
        self.read().carts.get(&user_id).cloned()
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.write().fail_on_get = fail;
    }

    pub fn set_fail_on_clear(&self, fail: bool) {
        self.write().fail_on_clear = fail;
    }

    pub fn get_calls(&self) -> usize {
        self.read().get_calls
    }

    pub fn clear_calls(&self) -> usize {
        self.read().clear_calls
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryCartState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryCartState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CartProvider for InMemoryCartProvider {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart, ServiceError> {
        let mut state = self.write();
        state.get_calls += 1;
        if state.fail_on_get {
            return Err(ServiceError::new("cart", "simulated outage"));
        }
        Ok(state
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<(), ServiceError> {
        let mut state = self.write();
        state.clear_calls += 1;
        if state.fail_on_clear {
            return Err(ServiceError::new("cart", "simulated outage"));
        }
        state.carts.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_cart_is_empty() {
        let provider = InMemoryCartProvider::new();
        let cart = provider.get_cart(UserId::new()).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Some(Money::zero()));
    }

    #[tokio::test]
    async fn test_put_get_and_clear() {
        let provider = InMemoryCartProvider::new();
        let user = UserId::new();
        provider.put_cart(Cart::new(
            user,
            vec![
                CartLine::new("p1", "Widget", 2, Money::from_cents(500)),
                CartLine::new("p2", "Gadget", 1, Money::from_cents(250)),
            ],
        ));

        let cart = provider.get_cart(user).await.unwrap();
        assert_eq!(cart.total(), Some(Money::from_cents(1250)));
        assert_eq!(cart.inventory_items()[0], InventoryItem::new("p1", 2));
        assert_eq!(cart.order_items()[1].line_total, Money::from_cents(250));

        provider.clear_cart(user).await.unwrap();
        assert!(provider.cart(user).is_none());
        assert_eq!(provider.clear_calls(), 1);
    }

    #[test]
    fn test_total_overflow_is_none() {
        let cart = Cart::new(
            UserId::new(),
            vec![
                CartLine::new("p1", "Widget", 1, Money::from_cents(i64::MAX)),
                CartLine::new("p2", "Gadget", 1, Money::from_cents(1)),
            ],
        );
        assert_eq!(cart.lines[0].line_total(), Some(Money::from_cents(i64::MAX)));
        assert_eq!(cart.total(), None);

        let line = CartLine::new("p1", "Widget", 2, Money::from_cents(i64::MAX));
        assert_eq!(line.line_total(), None);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let provider = InMemoryCartProvider::new();
        provider.set_fail_on_get(true);
        provider.set_fail_on_clear(true);

        assert!(provider.get_cart(UserId::new()).await.is_err());
        assert!(provider.clear_cart(UserId::new()).await.is_err());
        assert_eq!(provider.get_calls(), 1);
    }
}

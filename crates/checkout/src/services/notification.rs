use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{Address, Currency, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Payload of the order-confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub email: String,
    pub first_name: String,
    pub order_id: OrderId,
    pub items: Vec<ConfirmationLine>,
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
    pub currency: Currency,
    pub shipping_address: Address,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), ServiceError>;
}

/// Writes confirmations to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), ServiceError> {
        tracing::info!(
            order_id = %confirmation.order_id,
            email = %confirmation.email,
            total = %confirmation.total,
            currency = %confirmation.currency,
            lines = confirmation.items.len(),
            "Order confirmation sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderConfirmation>,
    failures_remaining: u32,
    attempts: usize,
}

/// Records delivered confirmations; can fail a fixed number of attempts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` delivery attempts.
    pub fn fail_next(&self, count: u32) {
        self.write().failures_remaining = count;
    }

    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.read().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.read().sent.len()
    }

    pub fn attempts(&self) -> usize {
        self.read().attempts
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryNotifierState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryNotifierState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), ServiceError> {
        let mut state = self.write();
        state.attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ServiceError::new("notification", "simulated outage"));
        }
        state.sent.push(confirmation.clone());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::confirmation;
    use super::*;

    #[tokio::test]
    async fn test_fail_next_then_deliver() {
        let notifier = InMemoryNotifier::new();
        notifier.fail_next(1);

        assert!(notifier.send_order_confirmation(&confirmation()).await.is_err());
        assert!(notifier.send_order_confirmation(&confirmation()).await.is_ok());
        assert_eq!(notifier.attempts(), 2);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send_order_confirmation(&confirmation()).await.is_ok());
    }
}

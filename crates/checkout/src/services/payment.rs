use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method_id: String,
    pub amount: Money,
    pub currency: Currency,
    /// Charges sharing a key are executed once.
    pub idempotency_key: String,
}

/// Answer to a charge that reached the gateway.
///
/// A decline is a receipt with `success == false`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub transaction_id: String,
    pub amount: Money,
    pub reason: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, ServiceError>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
        reason: &str,
    ) -> Result<RefundReceipt, ServiceError>;
}

#[derive(Debug, Clone)]
struct Transaction {
    amount: Money,
    refunded: Money,
}

#[derive(Debug)]
struct InMemoryPaymentState {
    transactions: HashMap<String, Transaction>,
    by_idempotency_key: HashMap<String, String>,
    refunds: Vec<RefundReceipt>,
    approval_limit: Money,
    decline_charges: bool,
    fail_on_charge: bool,
    fail_on_refund: bool,
    charge_delay: Option<Duration>,
    charge_calls: usize,
    refund_calls: usize,
    next_id: u64,
}

impl Default for InMemoryPaymentState {
    fn default() -> Self {
        Self {
            transactions: HashMap::new(),
            by_idempotency_key: HashMap::new(),
            refunds: Vec::new(),
            approval_limit: Money::from_cents(100_000),
            decline_charges: false,
            fail_on_charge: false,
            fail_on_refund: false,
            charge_delay: None,
            charge_calls: 0,
            refund_calls: 0,
            next_id: 1,
        }
    }
}

/// In-memory payment gateway.
///
/// Approves charges below the approval limit (1000.00 by default) and
/// answers a repeated idempotency key with the original transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every new charge.
    pub fn set_decline_charges(&self, decline: bool) {
        self.write().decline_charges = decline;
    }

    /// Makes `charge` fail as if the gateway were unreachable.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.write().fail_on_charge = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Delays every charge, after the transaction is recorded.
    pub fn set_charge_delay(&self, delay: Option<Duration>) {
        self.write().charge_delay = delay;
    }

    pub fn set_approval_limit(&self, limit: Money) {
        self.write().approval_limit = limit;
    }

    pub fn charge_calls(&self) -> usize {
        self.read().charge_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.read().refund_calls
    }

    /// Number of distinct captured transactions.
    pub fn transaction_count(&self) -> usize {
        self.read().transactions.len()
    }

    pub fn refunds(&self) -> Vec<RefundReceipt> {
        self.read().refunds.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, ServiceError> {
        let mut state = self.write();
        state.charge_calls += 1;
        if state.fail_on_charge {
            return Err(ServiceError::new("payment", "simulated outage"));
        }

        if let Some(existing) = state.by_idempotency_key.get(&request.idempotency_key) {
            return Ok(ChargeReceipt {
                success: true,
                transaction_id: Some(existing.clone()),
                error_message: None,
            });
        }

        if state.decline_charges || request.amount >= state.approval_limit {
            return Ok(ChargeReceipt {
                success: false,
                transaction_id: None,
                error_message: Some("card declined".to_string()),
            });
        }

        let transaction_id = format!("txn_{:08}", state.next_id);
        state.next_id += 1;
        state.transactions.insert(
            transaction_id.clone(),
            Transaction {
                amount: request.amount,
                refunded: Money::zero(),
            },
        );
        state
            .by_idempotency_key
            .insert(request.idempotency_key.clone(), transaction_id.clone());

        Ok(ChargeReceipt {
            success: true,
            transaction_id: Some(transaction_id),
            error_message: None,
        })
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, ServiceError> {
        let receipt = self.record_charge(&request)?;

        let delay = self.read().charge_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(receipt)
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
        reason: &str,
    ) -> Result<RefundReceipt, ServiceError> {
        let mut state = self.write();
        state.refund_calls += 1;
        if state.fail_on_refund {
            return Err(ServiceError::new("payment", "simulated outage"));
        }

        let Some(transaction) = state.transactions.get_mut(transaction_id) else {
            return Err(ServiceError::new(
                "payment",
                format!("unknown transaction {transaction_id}"),
            ));
        };
        if transaction.refunded + amount > transaction.amount {
            return Err(ServiceError::new(
                "payment",
                format!("refund exceeds captured amount of {transaction_id}"),
            ));
        }
        transaction.refunded += amount;

        let receipt = RefundReceipt {
            refund_id: format!("rf_{:08}", state.refunds.len() + 1),
            transaction_id: transaction_id.to_string(),
            amount,
            reason: reason.to_string(),
        };
        state.refunds.push(receipt.clone());
        Ok(receipt)
    }
}

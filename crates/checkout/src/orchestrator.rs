//! The checkout sequence and the order operations built around it.

use std::time::Instant;

use common::{Address, Money, OrderId, Page, PageRequest, UserId};
use inventory::{InventoryLedger, ReservationReceipt};
use orders::{NewOrder, Order, OrderDetails, OrderLedger, OrderLookup, OrderStatus, StatusUpdate};
use serde::{Deserialize, Serialize};

use crate::config::CheckoutConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::CheckoutError;
use crate::services::{
    Cart, CartProvider, ChargeRequest, ConfirmationLine, OrderConfirmation, PaymentGateway,
    ShippingQuoter,
};
use crate::step::{CheckoutOutcome, CheckoutStep, SideEffects, StepLog, StepStatus};

const ORDER_CREATED_NOTE: &str = "Order created";

/// Who receives the confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub shipping_address: Address,
    pub payment_method_id: String,
    /// No confirmation is sent without a recipient.
    #[serde(default)]
    pub recipient: Option<Recipient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefundOutcome {
    /// The order was never charged.
    NotApplicable,
    Refunded { refund_id: String },
    /// The refund call failed; the order is cancelled regardless.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub order: Order,
    pub refund: RefundOutcome,
    pub restocked_units: u64,
}

/// Running record of one attempt.
struct Attempt {
    order_id: OrderId,
    log: StepLog,
    residue: SideEffects,
}

impl Attempt {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            log: StepLog::new(),
            residue: SideEffects::default(),
        }
    }

    fn complete(&mut self, step: CheckoutStep, started: Instant) {
        self.log.record(step, StepStatus::Completed, started.elapsed());
    }

    fn skip(&mut self, step: CheckoutStep, reason: &str) {
        self.log.record(
            step,
            StepStatus::Skipped(reason.to_string()),
            std::time::Duration::ZERO,
        );
    }

    fn tolerate(&mut self, step: CheckoutStep, started: Instant, reason: String) {
        tracing::warn!(
            order_id = %self.order_id,
            step = %step,
            error = %reason,
            "Best-effort step failed"
        );
        metrics::counter!("checkout_best_effort_failures_total", "step" => step.as_str())
            .increment(1);
        self.log.record(step, StepStatus::BestEffortFailed(reason), started.elapsed());
    }

    fn fail(
        mut self,
        step: CheckoutStep,
        started: Instant,
        cause: CheckoutError,
    ) -> CheckoutOutcome {
        self.log.record(step, StepStatus::Failed(cause.to_string()), started.elapsed());
        metrics::counter!("checkout_failures_total", "step" => step.as_str()).increment(1);
        tracing::warn!(
            order_id = %self.order_id,
            step = %step,
            error = %cause,
            reservation_held = self.residue.reservation.is_some(),
            charge_captured = self.residue.transaction_id.is_some(),
            "Checkout failed"
        );
        CheckoutOutcome::FailedAt {
            step,
            cause,
            log: self.log,
            residue: self.residue,
        }
    }
}

/// Runs checkouts against a fixed set of collaborators.
pub struct CheckoutOrchestrator<C, I, Q, P, L> {
    carts: C,
    inventory: I,
    shipping: Q,
    payments: P,
    orders: L,
    notifications: NotificationDispatcher,
    config: CheckoutConfig,
}

impl<C, I, Q, P, L> CheckoutOrchestrator<C, I, Q, P, L>
where
    C: CartProvider,
    I: InventoryLedger,
    Q: ShippingQuoter,
    P: PaymentGateway,
    L: OrderLedger,
{
    pub fn new(
        carts: C,
        inventory: I,
        shipping: Q,
        payments: P,
        orders: L,
        notifications: NotificationDispatcher,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            carts,
            inventory,
            shipping,
            payments,
            orders,
            notifications,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Runs the checkout and converts the outcome into a result.
    pub async fn create_order(
        &self,
        request: CheckoutRequest,
    ) -> Result<OrderDetails, CheckoutError> {
        self.run_checkout(request).await.into_result()
    }

    /// Runs every checkout step in order, stopping at the first failure.
    ///
    /// Failed attempts are not compensated. The outcome's residue lists
    /// the reservation and charge that remain.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, order_id))]
    pub async fn run_checkout(&self, request: CheckoutRequest) -> CheckoutOutcome {
        metrics::counter!("checkout_attempts_total").increment(1);
        let checkout_started = Instant::now();
        let order_id = OrderId::new();
        tracing::Span::current().record("order_id", tracing::field::display(order_id));
        let mut attempt = Attempt::new(order_id);

        let started = Instant::now();
        if let Err(cause) = validate_request(&request) {
            return attempt.fail(CheckoutStep::ValidateRequest, started, cause);
        }
        attempt.complete(CheckoutStep::ValidateRequest, started);

        let started = Instant::now();
        let cart = match self.carts.get_cart(request.user_id).await {
            Ok(cart) if cart.is_empty() => {
                return attempt.fail(CheckoutStep::FetchCart, started, CheckoutError::EmptyCart);
            }
            Ok(cart) => cart,
            Err(e) => {
                let cause = CheckoutError::CartUnavailable(e);
                return attempt.fail(CheckoutStep::FetchCart, started, cause);
            }
        };
        attempt.complete(CheckoutStep::FetchCart, started);

        let started = Instant::now();
        let items = cart.inventory_items();
        match self.inventory.check_inventory(&items).await {
            Ok(check) if check.available => {}
            Ok(check) => {
                let cause = CheckoutError::InsufficientInventory {
                    product_ids: check.unavailable_product_ids,
                };
                return attempt.fail(CheckoutStep::CheckInventory, started, cause);
            }
            Err(e) => return attempt.fail(CheckoutStep::CheckInventory, started, e.into()),
        }
        attempt.complete(CheckoutStep::CheckInventory, started);

        let started = Instant::now();
        match self
            .inventory
            .reserve_inventory(order_id, &items, self.config.reservation_ttl_minutes)
            .await
        {
            Ok(receipt) => attempt.residue.reservation = Some(receipt),
            Err(e) => {
                let cause = CheckoutError::ReservationFailed(e.to_string());
                return attempt.fail(CheckoutStep::ReserveInventory, started, cause);
            }
        }
        attempt.complete(CheckoutStep::ReserveInventory, started);

        let started = Instant::now();
        let shipping = match self
            .shipping
            .get_quote(
                self.config.origin.as_ref(),
                &request.shipping_address,
                self.config.package_weight_grams,
            )
            .await
        {
            Ok(quotes) => match quotes.into_iter().next() {
                Some(quote) if quote.currency == cart.currency => quote.cost,
                Some(quote) => {
                    let cause = CheckoutError::QuoteUnavailable(format!(
                        "quote in {} for a cart in {}",
                        quote.currency, cart.currency
                    ));
                    return attempt.fail(CheckoutStep::QuoteShipping, started, cause);
                }
                None => {
                    let cause = CheckoutError::QuoteUnavailable("no quotes returned".to_string());
                    return attempt.fail(CheckoutStep::QuoteShipping, started, cause);
                }
            },
            Err(e) => {
                let cause = CheckoutError::QuoteUnavailable(e.to_string());
                return attempt.fail(CheckoutStep::QuoteShipping, started, cause);
            }
        };
        attempt.complete(CheckoutStep::QuoteShipping, started);

        let started = Instant::now();
        let tax = Money::zero();
        let totals = cart.total().and_then(|subtotal| {
            let total = subtotal.checked_add(shipping)?.checked_add(tax)?;
            Some((subtotal, total))
        });
        let Some((subtotal, total)) = totals else {
            let cause = CheckoutError::InvalidRequest("order total is out of range".to_string());
            return attempt.fail(CheckoutStep::ComputeTotals, started, cause);
        };
        attempt.complete(CheckoutStep::ComputeTotals, started);

        let started = Instant::now();
        let charge = ChargeRequest {
            order_id,
            user_id: request.user_id,
            payment_method_id: request.payment_method_id.clone(),
            amount: total,
            currency: cart.currency.clone(),
            idempotency_key: self
                .config
                .idempotency
                .key_for(order_id, request.user_id, &cart, subtotal),
        };
        let transaction_id = match self.payments.charge(charge).await {
            Ok(receipt) if receipt.success => match receipt.transaction_id {
                Some(id) => id,
                None => {
                    let cause = CheckoutError::PaymentFailed(
                        "gateway approved without a transaction id".to_string(),
                    );
                    return attempt.fail(CheckoutStep::ChargePayment, started, cause);
                }
            },
            Ok(receipt) => {
                let reason = receipt
                    .error_message
                    .unwrap_or_else(|| "charge declined".to_string());
                return attempt.fail(
                    CheckoutStep::ChargePayment,
                    started,
                    CheckoutError::PaymentFailed(reason),
                );
            }
            Err(e) => {
                let cause = CheckoutError::PaymentFailed(e.to_string());
                return attempt.fail(CheckoutStep::ChargePayment, started, cause);
            }
        };
        attempt.residue.transaction_id = Some(transaction_id.clone());
        attempt.complete(CheckoutStep::ChargePayment, started);

        let started = Instant::now();
        let new_order = NewOrder {
            id: order_id,
            user_id: request.user_id,
            status: OrderStatus::Confirmed,
            currency: cart.currency.clone(),
            items: cart.order_items(),
            subtotal,
            shipping,
            tax,
            shipping_address: request.shipping_address.clone(),
            payment_method_id: Some(request.payment_method_id.clone()),
            transaction_id: Some(transaction_id),
            note: ORDER_CREATED_NOTE.to_string(),
        };
        let order = match self.orders.create_order(new_order).await {
            Ok(order) => order,
            Err(e) => {
                let cause = CheckoutError::Persistence(e.to_string());
                return attempt.fail(CheckoutStep::CommitOrder, started, cause);
            }
        };
        if let Some(receipt) = attempt.residue.reservation.take() {
            self.commit_reservations(&receipt).await;
        }
        attempt.residue.transaction_id = None;
        attempt.complete(CheckoutStep::CommitOrder, started);

        let started = Instant::now();
        match self.carts.clear_cart(request.user_id).await {
            Ok(()) => attempt.complete(CheckoutStep::ClearCart, started),
            Err(e) => attempt.tolerate(CheckoutStep::ClearCart, started, e.to_string()),
        }

        let started = Instant::now();
        match &request.recipient {
            None => attempt.skip(CheckoutStep::NotifyBuyer, "no recipient"),
            Some(recipient) => {
                let confirmation = confirmation_for(recipient, &order);
                match self.notifications.submit(confirmation) {
                    Ok(()) => attempt.complete(CheckoutStep::NotifyBuyer, started),
                    Err(e) => attempt.tolerate(CheckoutStep::NotifyBuyer, started, e.to_string()),
                }
            }
        }

        metrics::counter!("checkout_succeeded_total").increment(1);
        metrics::histogram!("checkout_duration_seconds")
            .record(checkout_started.elapsed().as_secs_f64());
        tracing::info!(
            total = %order.order.total,
            currency = %order.order.currency,
            lines = order.items.len(),
            "Order confirmed"
        );

        CheckoutOutcome::Succeeded {
            order,
            log: attempt.log,
        }
    }

    /// Marks the order's reservations as sold. Rows left held are settled
    /// by the reaper.
    async fn commit_reservations(&self, receipt: &ReservationReceipt) {
        for id in receipt.reservation_ids() {
            if let Err(e) = self.inventory.commit_reservation(id).await {
                tracing::warn!(reservation_id = %id, error = %e, "Failed to commit reservation");
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(
        &self,
        lookup: &OrderLookup,
        user_id: UserId,
    ) -> Result<OrderDetails, CheckoutError> {
        Ok(self.orders.get_order(lookup, user_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: UserId,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>, CheckoutError> {
        Ok(self.orders.list_orders(user_id, page, status).await?)
    }

    /// Applies a status change under the configured transition policy.
    #[tracing::instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, CheckoutError> {
        if update.status == OrderStatus::Unspecified {
            return Err(CheckoutError::InvalidStatus(update.status.to_string()));
        }
        let order = self
            .orders
            .update_status(order_id, update, self.config.transition_policy)
            .await?;
        metrics::counter!("orders_status_updates_total", "status" => order.status.as_str())
            .increment(1);
        Ok(order)
    }

    /// Cancels the order, then refunds and restocks on a best-effort basis.
    ///
    /// Orders that have shipped, been delivered or already been cancelled
    /// or refunded are rejected without any write.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<CancellationOutcome, CheckoutError> {
        let order = self.orders.cancel_order(order_id, user_id, reason).await?;
        metrics::counter!("orders_cancelled_total").increment(1);

        let refund = match order.transaction_id.as_deref() {
            None => RefundOutcome::NotApplicable,
            Some(transaction_id) => {
                match self.payments.refund(transaction_id, order.total, reason).await {
                    Ok(receipt) => RefundOutcome::Refunded {
                        refund_id: receipt.refund_id,
                    },
                    Err(e) => {
                        metrics::counter!("orders_refund_failures_total").increment(1);
                        tracing::warn!(error = %e, "Refund failed for cancelled order");
                        RefundOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };

        let restocked_units = if self.config.restock_on_cancel {
            match self.inventory.release_order_reservations(order_id).await {
                Ok(units) => units,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to restock cancelled order");
                    0
                }
            }
        } else {
            0
        };

        tracing::info!(restocked_units, "Order cancelled");
        Ok(CancellationOutcome {
            order,
            refund,
            restocked_units,
        })
    }
}

fn validate_request(request: &CheckoutRequest) -> Result<(), CheckoutError> {
    if request.payment_method_id.trim().is_empty() {
        return Err(CheckoutError::InvalidRequest(
            "payment method is required".to_string(),
        ));
    }
    if !request.shipping_address.is_complete() {
        return Err(CheckoutError::InvalidRequest(
            "shipping address is incomplete".to_string(),
        ));
    }
    Ok(())
}

fn confirmation_for(recipient: &Recipient, details: &OrderDetails) -> OrderConfirmation {
    let order = &details.order;
    OrderConfirmation {
        email: recipient.email.clone(),
        first_name: recipient.first_name.clone(),
        order_id: order.id,
        items: details
            .items
            .iter()
            .map(|item| ConfirmationLine {
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect(),
        subtotal: order.subtotal,
        shipping: order.shipping,
        total: order.total,
        currency: order.currency.clone(),
        shipping_address: order.shipping_address.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            user_id: UserId::new(),
            shipping_address: Address::new("1 Main St", "Springfield", "IL", "62701", "US"),
            payment_method_id: "pm_card".to_string(),
            recipient: None,
        }
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request()).is_ok());

        let mut missing_method = request();
        missing_method.payment_method_id = String::new();
        assert!(matches!(
            validate_request(&missing_method),
            Err(CheckoutError::InvalidRequest(_))
        ));

        let mut missing_zip = request();
        missing_zip.shipping_address.zip_code = " ".to_string();
        assert!(matches!(
            validate_request(&missing_zip),
            Err(CheckoutError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_recipient_defaults_to_none() {
        let json = serde_json::json!({
            "user_id": UserId::new(),
            "shipping_address": {
                "street": "1 Main St",
                "city": "Springfield",
                "zip_code": "62701",
                "country": "US"
            },
            "payment_method_id": "pm_card"
        });
        let parsed: CheckoutRequest = serde_json::from_value(json).unwrap();
        assert!(parsed.recipient.is_none());
    }
}

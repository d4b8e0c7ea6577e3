//! Background delivery of order confirmations.
//!
//! Checkout only enqueues. A single worker drains the bounded queue and
//! retries each delivery with backoff; delivery failures never reach the
//! buyer's request.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::services::{Notifier, OrderConfirmation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification dispatcher has shut down")]
    Closed,
}

/// Handle for enqueuing confirmations. The worker stops once every handle
/// has been dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<OrderConfirmation>,
}

impl NotificationDispatcher {
    /// Starts the delivery worker on the current runtime.
    pub fn spawn<N>(notifier: N, capacity: usize, retry: RetryPolicy) -> (Self, JoinHandle<()>)
    where
        N: Notifier + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(notifier, receiver, retry));
        (Self { sender }, handle)
    }

    /// Enqueues without waiting. A full queue drops the confirmation.
    pub fn submit(&self, confirmation: OrderConfirmation) -> Result<(), DispatchError> {
        match self.sender.try_send(confirmation) {
            Ok(()) => {
                metrics::counter!("notifications_enqueued_total").increment(1);
                Ok(())
            }
            Err(TrySendError::Full(dropped)) => {
                metrics::counter!("notifications_dropped_total").increment(1);
                tracing::warn!(
                    order_id = %dropped.order_id,
                    "Notification queue full, dropping order confirmation"
                );
                Err(DispatchError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }
}

async fn run_worker<N: Notifier>(
    notifier: N,
    mut receiver: mpsc::Receiver<OrderConfirmation>,
    retry: RetryPolicy,
) {
    while let Some(confirmation) = receiver.recv().await {
        let notifier = &notifier;
        let message = &confirmation;
        let result = retry_with_backoff(&retry, move |_| {
            notifier.send_order_confirmation(message)
        })
        .await;

        match result {
            Ok(()) => {
                metrics::counter!("notifications_sent_total").increment(1);
                tracing::debug!(order_id = %confirmation.order_id, "Order confirmation delivered");
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::error!(
                    order_id = %confirmation.order_id,
                    error = %e,
                    "Giving up on order confirmation"
                );
            }
        }
    }
    tracing::info!("Notification dispatcher stopped");
}

//! Settles reservations whose hold window has passed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use inventory::{InventoryLedger, Result as InventoryResult};
use orders::OrderLedger;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    /// Order was persisted; the units stay sold.
    pub committed: usize,
    /// No order behind the hold; the units went back to stock.
    pub released: usize,
    pub failed: usize,
}

/// Periodically resolves expired held reservations: commit when the order
/// exists, release otherwise.
#[derive(Debug, Clone)]
pub struct ReservationReaper<I, L> {
    inventory: I,
    orders: L,
}

impl<I, L> ReservationReaper<I, L>
where
    I: InventoryLedger + 'static,
    L: OrderLedger + 'static,
{
    pub fn new(inventory: I, orders: L) -> Self {
        Self { inventory, orders }
    }

    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> InventoryResult<SweepReport> {
        let expired = self.inventory.expired_reservations(now).await?;
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        for reservation in expired {
            let order_exists = match self.orders.order_exists(reservation.order_id).await {
                Ok(exists) => exists,
                Err(e) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %e,
                        "Could not look up order for expired reservation"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let settled = if order_exists {
                self.inventory.commit_reservation(reservation.id).await
            } else {
                self.inventory.release_reservation(reservation.id).await
            };

            match settled {
                Ok(true) if order_exists => report.committed += 1,
                Ok(true) => report.released += 1,
                // Settled concurrently by someone else.
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %e,
                        "Failed to settle reservation"
                    );
                    report.failed += 1;
                }
            }
        }

        metrics::counter!("reaper_committed_total").increment(report.committed as u64);
        metrics::counter!("reaper_released_total").increment(report.released as u64);
        metrics::counter!("reaper_failures_total").increment(report.failed as u64);
        Ok(report)
    }

    /// Sweeps every `every` until `shutdown` turns true or its sender drops.
    pub fn spawn(self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once(Utc::now()).await {
                            Ok(report) if report.examined > 0 => {
                                tracing::info!(
                                    committed = report.committed,
                                    released = report.released,
                                    failed = report.failed,
                                    "Reservation sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "Reservation sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Reservation reaper stopped");
        })
    }
}

//! Per-attempt bookkeeping of the checkout sequence.

use std::time::Duration;

use inventory::ReservationReceipt;
use orders::OrderDetails;
use serde::Serialize;

use crate::error::CheckoutError;

/// The fixed steps of a checkout, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    ValidateRequest,
    FetchCart,
    CheckInventory,
    ReserveInventory,
    QuoteShipping,
    ComputeTotals,
    ChargePayment,
    CommitOrder,
    ClearCart,
    NotifyBuyer,
}

impl CheckoutStep {
    pub const ALL: [CheckoutStep; 10] = [
        CheckoutStep::ValidateRequest,
        CheckoutStep::FetchCart,
        CheckoutStep::CheckInventory,
        CheckoutStep::ReserveInventory,
        CheckoutStep::QuoteShipping,
        CheckoutStep::ComputeTotals,
        CheckoutStep::ChargePayment,
        CheckoutStep::CommitOrder,
        CheckoutStep::ClearCart,
        CheckoutStep::NotifyBuyer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::ValidateRequest => "validate_request",
            CheckoutStep::FetchCart => "fetch_cart",
            CheckoutStep::CheckInventory => "check_inventory",
            CheckoutStep::ReserveInventory => "reserve_inventory",
            CheckoutStep::QuoteShipping => "quote_shipping",
            CheckoutStep::ComputeTotals => "compute_totals",
            CheckoutStep::ChargePayment => "charge_payment",
            CheckoutStep::CommitOrder => "commit_order",
            CheckoutStep::ClearCart => "clear_cart",
            CheckoutStep::NotifyBuyer => "notify_buyer",
        }
    }

    /// Best-effort steps are logged on failure and never abort the checkout.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, CheckoutStep::ClearCart | CheckoutStep::NotifyBuyer)
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed(String),
    Skipped(String),
    /// A best-effort step failed; the checkout continued.
    BestEffortFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: CheckoutStep,
    #[serde(flatten)]
    pub status: StepStatus,
    pub elapsed: Duration,
}

/// Outcome of every step that ran, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, step: CheckoutStep, status: StepStatus, elapsed: Duration) {
        self.records.push(StepRecord {
            step,
            status,
            elapsed,
        });
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn status_of(&self, step: CheckoutStep) -> Option<&StepStatus> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }

    pub fn completed_steps(&self) -> Vec<CheckoutStep> {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| r.step)
            .collect()
    }

    pub fn failed_step(&self) -> Option<CheckoutStep> {
        self.records
            .iter()
            .find(|r| matches!(r.status, StepStatus::Failed(_)))
            .map(|r| r.step)
    }
}

/// External side effects left behind by a failed attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffects {
    /// Stock held for the attempt; reclaimed by the reaper once expired.
    pub reservation: Option<ReservationReceipt>,
    /// Captured charge with no order row behind it.
    pub transaction_id: Option<String>,
}

impl SideEffects {
    pub fn is_clean(&self) -> bool {
        self.reservation.is_none() && self.transaction_id.is_none()
    }
}

#[derive(Debug)]
pub enum CheckoutOutcome {
    Succeeded {
        order: OrderDetails,
        log: StepLog,
    },
    FailedAt {
        step: CheckoutStep,
        cause: CheckoutError,
        log: StepLog,
        residue: SideEffects,
    },
}

impl CheckoutOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckoutOutcome::Succeeded { .. })
    }

    pub fn log(&self) -> &StepLog {
        match self {
            CheckoutOutcome::Succeeded { log, .. } | CheckoutOutcome::FailedAt { log, .. } => log,
        }
    }

    pub fn into_result(self) -> Result<OrderDetails, CheckoutError> {
        match self {
            CheckoutOutcome::Succeeded { order, .. } => Ok(order),
            CheckoutOutcome::FailedAt { cause, .. } => Err(cause),
        }
    }
}

//! Payment domain models and the lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fees::FeeCalculationData;

/// Lifecycle status of a payment link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    /// SUCCESS, FAILED and EXPIRED are terminal; only PENDING can move.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that may move a payment link out of PENDING
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    /// Verified gateway webhook reported the payment as captured.
    GatewaySuccess { utr: Option<String> },
    /// Verified gateway webhook reported the payment as failed.
    GatewayFailure { reason: Option<String> },
    /// Administrative "mark successful" escape hatch.
    ManualSuccess,
    /// Staleness expiry (reaper sweep or lazy cleanup at creation time).
    Expire { reason: String },
    /// User-initiated cancellation of their own pending link.
    Cancel,
}

impl TransitionEvent {
    /// Audit tag persisted as the settlement source for success transitions.
    pub fn source(&self) -> &'static str {
        match self {
            TransitionEvent::GatewaySuccess { .. } => "webhook",
            TransitionEvent::GatewayFailure { .. } => "webhook",
            TransitionEvent::ManualSuccess => "manual",
            TransitionEvent::Expire { .. } => "reaper",
            TransitionEvent::Cancel => "user",
        }
    }
}

/// Why a transition was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRejected {
    /// The record already reached a terminal status; the attempt is a no-op.
    AlreadyTerminal(PaymentStatus),
}

/// The single transition function of the payment state machine.
///
/// Centralizes the "already terminal → no-op" rule: whichever of
/// {webhook, manual mark, reaper, cancel} reaches a PENDING record first
/// wins, and every later attempt is rejected here.
pub fn transition(
    current: PaymentStatus,
    event: &TransitionEvent,
) -> Result<PaymentStatus, TransitionRejected> {
    if current.is_terminal() {
        return Err(TransitionRejected::AlreadyTerminal(current));
    }
    let next = match event {
        TransitionEvent::GatewaySuccess { .. } | TransitionEvent::ManualSuccess => {
            PaymentStatus::Success
        }
        TransitionEvent::GatewayFailure { .. } => PaymentStatus::Failed,
        TransitionEvent::Expire { .. } | TransitionEvent::Cancel => PaymentStatus::Expired,
    };
    Ok(next)
}

/// A payment link record: one checkout attempt and its outcome.
///
/// Records are append-mostly and never deleted; terminal transitions and
/// settlement artifacts are the only mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    /// Internal record id
    pub id: String,
    /// Externally-visible opaque token, unique and immutable
    pub link_id: String,
    pub link_url: String,
    pub user_id: String,
    pub customer_id: String,
    pub phone: String,
    /// Owning admin account, resolved from the plan at creation
    pub tenant_id: Option<String>,
    pub channel_bundle_id: Option<String>,
    pub amount: f64,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    /// Free-form duration string as received ("30", "1 month", "1 year")
    pub duration: String,
    pub status: PaymentStatus,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Settlement reference code from the provider, set on SUCCESS
    pub utr: Option<String>,
    pub platform_fee: Option<f64>,
    pub net_amount: Option<f64>,
    pub fee_calculation_data: Option<FeeCalculationData>,
    /// Which path settled the record ("webhook" | "manual")
    pub settlement_source: Option<String>,
    /// True when this purchase extends an existing subscription
    pub is_extension: bool,
    /// Subscription expiry, independent of the payment status
    pub expiry_date: DateTime<Utc>,
}

impl PaymentLink {
    /// Age of the record in whole minutes as of `now`.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }
}

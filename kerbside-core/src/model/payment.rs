//! Payment ledger records and gateway receipts.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{CollectionId, PaymentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What a payment was for.
pub enum PaymentKind {
    /// Premium subscription.
    Subscription,
    /// Fee of a bulk collection.
    BulkCollection,
    /// Fine for misuse.
    Fine,
    /// One-off premium feature.
    PremiumFeature,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Lifecycle of a payment at the gateway.
pub enum PaymentStatus {
    /// Recorded but not yet sent to the gateway.
    #[default]
    Pending,
    /// Gateway is processing.
    Processing,
    /// Money received.
    Completed,
    /// Gateway declined.
    Failed,
    /// Called off before completion.
    Cancelled,
    /// Money returned.
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ledger record of a settled or attempted payment.
pub struct Payment {
    /// Identifier.
    pub id: PaymentId,
    /// Paying user.
    pub user: UserId,
    /// What the payment was for.
    pub kind: PaymentKind,
    /// Amount charged.
    pub amount: f64,
    /// Gateway status.
    pub status: PaymentStatus,
    /// Gateway transaction id.
    pub transaction_id: Option<String>,
    /// Collection paid for, when applicable.
    pub collection: Option<CollectionId>,
    /// Refund issued against this payment.
    #[serde(default)]
    pub refund: Option<PaymentRefund>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Days after creation during which a completed payment can be refunded.
pub const REFUND_WINDOW_DAYS: i64 = 30;

impl Payment {
    /// Completed, and created less than [`REFUND_WINDOW_DAYS`] days before `now`.
    #[must_use]
    pub fn is_refundable(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Completed
            && now - self.created_at < TimeDelta::days(REFUND_WINDOW_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Money returned on a payment.
pub struct PaymentRefund {
    /// Amount returned.
    pub amount: f64,
    /// Why it was returned.
    pub reason: String,
    /// Who asked for it.
    pub requested_by: UserId,
    /// When the processor accepted it.
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Filter for ledger listings; absent fields match everything.
pub struct PaymentFilter {
    /// Only payments by this user.
    pub user: Option<UserId>,
    /// Only payments for this purpose.
    pub kind: Option<PaymentKind>,
    /// Only payments in this status.
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    /// Whether `payment` passes this filter.
    #[must_use]
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user.as_ref().is_none_or(|user| &payment.user == user)
            && self.kind.is_none_or(|kind| payment.kind == kind)
            && self.status.is_none_or(|status| payment.status == status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Result reported by the payment collaborator.
pub struct GatewayReceipt {
    /// Gateway transaction id.
    pub transaction_id: String,
    /// Status after the call.
    pub status: PaymentStatus,
}

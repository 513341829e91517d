//! Ledger commits and what a settled or refunded payment changes elsewhere.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{
    Collection, Payment, PaymentId, PaymentKind, PaymentRefund, PaymentStatus, Role, UserProfile,
};

/// Price of one premium term.
pub const SUBSCRIPTION_FEE: f64 = 99.0;
/// Length of one premium term in months.
pub const PREMIUM_TERM_MONTHS: u32 = 12;

/// End of a premium term bought at `paid_at`.
///
/// An unexpired term is extended from its current end.
///
/// # Errors
///
/// Returns [`CoreError::InvalidState`] for an open-ended premium account and
/// [`CoreError::InvalidInput`] when the end is not representable.
pub fn premium_until(profile: &UserProfile, paid_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let from = match profile.premium_expiry {
        None if profile.role == Role::PremiumResident => {
            return Err(CoreError::invalid_state(format!(
                "{} already holds an open-ended subscription",
                profile.id
            )));
        }
        Some(expiry) if profile.role == Role::PremiumResident && expiry > paid_at => expiry,
        _ => paid_at,
    };
    from.checked_add_months(Months::new(PREMIUM_TERM_MONTHS))
        .ok_or_else(|| CoreError::invalid_input("premium term ends out of range"))
}

fn settle_collection(entry: &Payment, collection: Option<&mut Collection>) -> Result<()> {
    let id = entry
        .collection
        .as_ref()
        .ok_or_else(|| CoreError::invalid_input("bulk payment names no collection"))?;
    let collection = collection.ok_or_else(|| CoreError::not_found("collection", id))?;
    let Some(fee) = collection.payment.as_mut() else {
        return Err(CoreError::invalid_state(format!(
            "collection {id} has no payment"
        )));
    };
    if fee.status != PaymentStatus::Pending {
        return Err(CoreError::Conflict(format!(
            "payment of collection {id} is already {:?}",
            fee.status
        )));
    }
    fee.status = entry.status;
    fee.transaction_id.clone_from(&entry.transaction_id);
    Ok(())
}

fn grant_premium(entry: &Payment, payer: Option<&mut UserProfile>) -> Result<()> {
    let profile = payer.ok_or_else(|| CoreError::not_found("user", &entry.user))?;
    if entry.status != PaymentStatus::Completed {
        return Ok(());
    }
    profile.premium_expiry = Some(premium_until(profile, entry.created_at)?);
    profile.role = Role::PremiumResident;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One change to the ledger together with its effects, applied by the store as a unit.
pub enum PaymentCommit {
    /// Append a processed payment and apply what it paid for.
    Record(Payment),
    /// Return money on an existing ledger entry.
    Refund {
        /// Entry being refunded.
        payment: PaymentId,
        /// Details recorded on it.
        refund: PaymentRefund,
    },
}

impl PaymentCommit {
    /// Ledger entry the commit writes.
    #[must_use]
    pub fn payment_id(&self) -> &PaymentId {
        match self {
            Self::Record(payment) => &payment.id,
            Self::Refund { payment, .. } => payment,
        }
    }

    /// Starting value of the ledger entry, given what the ledger holds under its id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] when recording over an existing id and
    /// [`CoreError::NotFound`] when refunding an unknown one.
    pub fn entry(&self, stored: Option<Payment>) -> Result<Payment> {
        match (self, stored) {
            (Self::Record(payment), None) => Ok(payment.clone()),
            (Self::Record(payment), Some(_)) => Err(CoreError::Conflict(format!(
                "payment {} exists",
                payment.id
            ))),
            (Self::Refund { .. }, Some(stored)) => Ok(stored),
            (Self::Refund { payment, .. }, None) => Err(CoreError::not_found("payment", payment)),
        }
    }

    /// Apply the commit to the ledger entry and current copies of the collection
    /// it references and the paying user, when they exist.
    ///
    /// A recorded bulk fee settles its collection's payment and a completed
    /// subscription grants a premium term; refunds also mark the collection's fee
    /// refunded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when a required collection or payer is
    /// missing, [`CoreError::Conflict`] when a bulk fee was already settled, and
    /// [`CoreError::InvalidState`] when refunding a payment that is not refundable.
    pub fn apply(
        &self,
        entry: &mut Payment,
        collection: Option<&mut Collection>,
        payer: Option<&mut UserProfile>,
    ) -> Result<()> {
        match self {
            Self::Record(_) => match entry.kind {
                PaymentKind::BulkCollection => settle_collection(entry, collection),
                PaymentKind::Subscription => grant_premium(entry, payer),
                PaymentKind::Fine | PaymentKind::PremiumFeature => Ok(()),
            },
            Self::Refund { refund, .. } => {
                if !entry.is_refundable(refund.processed_at) {
                    return Err(CoreError::invalid_state(format!(
                        "payment {} is not refundable",
                        entry.id
                    )));
                }
                entry.status = PaymentStatus::Refunded;
                entry.refund = Some(refund.clone());
                if let Some(fee) = collection.and_then(|collection| collection.payment.as_mut()) {
                    fee.status = PaymentStatus::Refunded;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Entities as written by a payment commit.
pub struct PaymentReceipt {
    /// The ledger entry.
    pub payment: Payment,
    /// The collection it references, when there is one.
    pub collection: Option<Collection>,
    /// The paying user, when still in the directory.
    pub payer: Option<UserProfile>,
}

use std::cmp::Reverse;

use tracing::info;

use super::{KerbsideService, PaymentConfirmation, Subscription};
use crate::access::{self, Capability};
use crate::error::{CoreError, Result};
use crate::model::{
    CollectionId, Page, PageRequest, Payment, PaymentFilter, PaymentId, PaymentKind,
    PaymentRefund, PaymentStatus, Principal, UserId,
};
use crate::payments::{self, PaymentCommit, SUBSCRIPTION_FEE};
use crate::validate;

impl KerbsideService {
    // Open an intent for `amount` and confirm it straight away.
    async fn charge(
        &self,
        user: &UserId,
        amount: f64,
        description: &str,
    ) -> Result<(String, PaymentStatus)> {
        let intent = self
            .backend
            .gateway
            .create_intent(user, amount, description)
            .await?;
        let receipt = self.backend.gateway.confirm(&intent.transaction_id).await?;
        Ok((receipt.transaction_id, receipt.status))
    }

    async fn payment(&self, id: &PaymentId) -> Result<Payment> {
        self.backend
            .payments
            .find_payment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("payment", id))
    }

    /// Settle the pending fee of a bulk pickup with the payment processor.
    ///
    /// The collection's fee and the ledger entry are written together.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor requested the pickup,
    /// [`CoreError::InvalidState`] without a pending payment, [`CoreError::Conflict`]
    /// when the payment was settled concurrently, [`CoreError::NotFound`] for an
    /// unknown id, or a gateway or store error.
    pub async fn confirm_payment(
        &self,
        actor: &Principal,
        id: &CollectionId,
    ) -> Result<PaymentConfirmation> {
        let current = self.collection(id).await?;
        let owner = current
            .resident
            .as_ref()
            .ok_or_else(|| CoreError::forbidden("only the requesting resident can pay"))?;
        access::require_owner(&actor.id, owner, "collection")?;
        let amount = match &current.payment {
            Some(payment) if payment.status == PaymentStatus::Pending => payment.amount,
            _ => {
                return Err(CoreError::invalid_state(format!(
                    "collection {id} has no pending payment"
                )));
            }
        };

        let (transaction_id, status) = self
            .charge(&actor.id, amount, &format!("Bulk collection {id}"))
            .await?;
        let receipt = self
            .backend
            .payments
            .commit_payment(&PaymentCommit::Record(Payment {
                id: PaymentId::generate(),
                user: actor.id.clone(),
                kind: PaymentKind::BulkCollection,
                amount,
                status,
                transaction_id: Some(transaction_id.clone()),
                collection: Some(id.clone()),
                refund: None,
                created_at: self.now(),
            }))
            .await?;
        let collection = receipt
            .collection
            .ok_or_else(|| CoreError::not_found("collection", id))?;
        info!(
            collection = %id,
            transaction = %transaction_id,
            amount,
            "bulk payment confirmed"
        );
        Ok(PaymentConfirmation {
            collection,
            payment: receipt.payment,
        })
    }

    /// Buy a premium term for the acting resident.
    ///
    /// The ledger entry and the upgrade to premium are written together; a running
    /// term is extended from its end.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for staff, [`CoreError::InvalidState`] for an
    /// open-ended premium account, [`CoreError::NotFound`] for a user missing from
    /// the directory, or a gateway or store error.
    pub async fn purchase_subscription(&self, actor: &Principal) -> Result<Subscription> {
        actor.require(Capability::Subscribe)?;
        let now = self.now();
        // fail before charging anyone
        payments::premium_until(&self.user(&actor.id).await?, now)?;

        let (transaction_id, status) = self
            .charge(&actor.id, SUBSCRIPTION_FEE, "Premium subscription")
            .await?;
        let receipt = self
            .backend
            .payments
            .commit_payment(&PaymentCommit::Record(Payment {
                id: PaymentId::generate(),
                user: actor.id.clone(),
                kind: PaymentKind::Subscription,
                amount: SUBSCRIPTION_FEE,
                status,
                transaction_id: Some(transaction_id),
                collection: None,
                refund: None,
                created_at: now,
            }))
            .await?;
        let profile = receipt
            .payer
            .ok_or_else(|| CoreError::not_found("user", &actor.id))?;
        info!(
            user = %profile.id,
            until = ?profile.premium_expiry,
            payment = %receipt.payment.id,
            "subscription purchased"
        );
        Ok(Subscription {
            payment: receipt.payment,
            profile,
        })
    }

    /// Return money on a completed payment, in full unless `amount` is given.
    ///
    /// A refunded bulk fee is also marked refunded on its collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is an admin or the payer,
    /// [`CoreError::InvalidInput`] for a blank reason or a bad amount,
    /// [`CoreError::InvalidState`] unless the payment is completed and less than
    /// thirty days old, [`CoreError::NotFound`] for an unknown id, or a gateway or
    /// store error.
    pub async fn refund_payment(
        &self,
        actor: &Principal,
        id: &PaymentId,
        amount: Option<f64>,
        reason: &str,
    ) -> Result<Payment> {
        let payment = self.payment(id).await?;
        if !actor.is_admin() {
            access::require_owner(&actor.id, &payment.user, "payment")?;
        }
        validate::refund(amount, reason, payment.amount)?;
        let now = self.now();
        if !payment.is_refundable(now) {
            return Err(CoreError::invalid_state(format!(
                "payment {id} is not refundable"
            )));
        }
        let Some(transaction_id) = payment.transaction_id.as_deref() else {
            return Err(CoreError::invalid_state(format!(
                "payment {id} never reached the processor"
            )));
        };

        let amount = amount.unwrap_or(payment.amount);
        self.backend.gateway.refund(transaction_id, amount).await?;
        let receipt = self
            .backend
            .payments
            .commit_payment(&PaymentCommit::Refund {
                payment: id.clone(),
                refund: PaymentRefund {
                    amount,
                    reason: reason.trim().to_owned(),
                    requested_by: actor.id.clone(),
                    processed_at: now,
                },
            })
            .await?;
        info!(payment = %id, amount, by = %actor.id, "payment refunded");
        Ok(receipt.payment)
    }

    /// Page through ledger entries, newest first.
    ///
    /// Everyone but admins sees only their own payments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a bad page, or a store error.
    pub async fn list_payments(
        &self,
        actor: &Principal,
        mut filter: PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        validate::page(page)?;
        if !actor.is_admin() {
            filter.user = Some(actor.id.clone());
        }
        let mut found: Vec<Payment> = self
            .backend
            .payments
            .list_payments()
            .await?
            .into_iter()
            .filter(|payment| filter.matches(payment))
            .collect();
        found.sort_by_key(|payment| Reverse(payment.created_at));
        Ok(Page::paginate(found, page))
    }
}

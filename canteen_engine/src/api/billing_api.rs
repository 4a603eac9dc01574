use std::fmt::Debug;

use log::*;

use crate::{
    access,
    db_types::{Actor, NewPaymentRequest, PaymentRequest, PaymentRequestStatus, PaymentSubmission, StudentId},
    traits::{CanteenDatabase, CanteenDbError, SettledSubmission},
};

/// `BillingApi` is the ad-hoc bulk payment dispatcher: admins fan a billing event out to a
/// computed student set, students settle their own obligation from their wallet.
pub struct BillingApi<B> {
    db: B,
}

impl<B> Debug for BillingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BillingApi")
    }
}

impl<B> BillingApi<B>
where B: CanteenDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Creates a payment request and its full fan-out of `pending` submissions in one
    /// transaction. See [`CanteenDatabase::create_payment_request`] for the resolution rules.
    pub async fn create_request(
        &self,
        actor: &Actor,
        request: NewPaymentRequest,
    ) -> Result<PaymentRequest, CanteenDbError> {
        access::ensure_admin(actor)?;
        self.db.create_payment_request(request, &actor.id).await
    }

    /// Settles the student's obligation under the request: one wallet debit, the submission
    /// flipped to `paid`, and the request counters bumped, atomically. Retrying a successful
    /// payment fails with [`CanteenDbError::AlreadyPaid`] instead of charging twice.
    pub async fn pay(
        &self,
        actor: &Actor,
        student_id: &StudentId,
        request_id: i64,
    ) -> Result<SettledSubmission, CanteenDbError> {
        access::ensure_self_or_staff(actor, student_id)?;
        match self.db.settle_submission(student_id, request_id).await {
            Err(e) if e.is_retryable() => {
                warn!("💳 Transient conflict settling request #{request_id} for {student_id}; retrying once");
                self.db.settle_submission(student_id, request_id).await
            },
            other => other,
        }
    }

    /// Closes or cancels an active request; no payments are accepted afterwards.
    pub async fn close(
        &self,
        actor: &Actor,
        request_id: i64,
        status: PaymentRequestStatus,
    ) -> Result<PaymentRequest, CanteenDbError> {
        access::ensure_admin(actor)?;
        self.db.close_payment_request(request_id, status).await
    }

    pub async fn request(&self, request_id: i64) -> Result<Option<PaymentRequest>, CanteenDbError> {
        Ok(self.db.fetch_payment_request(request_id).await?)
    }

    pub async fn submission(
        &self,
        request_id: i64,
        student_id: &StudentId,
    ) -> Result<Option<PaymentSubmission>, CanteenDbError> {
        Ok(self.db.fetch_submission(request_id, student_id).await?)
    }

    pub async fn submissions(&self, request_id: i64) -> Result<Vec<PaymentSubmission>, CanteenDbError> {
        Ok(self.db.submissions_for_request(request_id).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

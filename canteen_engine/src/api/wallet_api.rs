use std::fmt::Debug;

use log::*;

use crate::{
    access,
    api::ledger_objects::LedgerQueryFilter,
    db_types::{Actor, LedgerEntry, LedgerEntryType, Money, NewLedgerEntry, StudentId},
    traits::{BalanceReconciliation, CanteenDatabase, CanteenDbError},
};

/// `WalletApi` is the ledger-facing API: top-ups, ad-hoc postings, history queries and the
/// explicit balance reconciliation audit.
pub struct WalletApi<B> {
    db: B,
}

impl<B> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi")
    }
}

impl<B> WalletApi<B>
where B: CanteenDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Credits a student's wallet. Only admins may move money into wallets; the credit and the
    /// balance update land in one transaction.
    pub async fn deposit<S: Into<String>>(
        &self,
        actor: &Actor,
        student_id: &StudentId,
        amount: Money,
        description: S,
    ) -> Result<LedgerEntry, CanteenDbError> {
        access::ensure_admin(actor)?;
        let entry = NewLedgerEntry::new(student_id.clone(), LedgerEntryType::Credit, amount, description)
            .by_actor(actor.id.clone());
        self.post_entry(entry).await
    }

    /// Posts an arbitrary ledger entry. Used by the flows above it and exposed for corrective
    /// entries; a debit that would overdraw the wallet is refused.
    pub async fn post_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, CanteenDbError> {
        match self.db.post_ledger_entry(entry.clone()).await {
            Err(e) if e.is_retryable() => {
                warn!("🧾 Transient conflict posting a {} for {}; retrying once", entry.entry_type, entry.student_id);
                self.db.post_ledger_entry(entry).await
            },
            other => other,
        }
    }

    /// The student's wallet history across every partition the filter touches, newest first.
    pub async fn history(
        &self,
        student_id: &StudentId,
        filter: LedgerQueryFilter,
    ) -> Result<Vec<LedgerEntry>, CanteenDbError> {
        Ok(self.db.ledger_history(student_id, filter).await?)
    }

    /// The cached balance, or `None` for an unknown student.
    pub async fn balance(&self, student_id: &StudentId) -> Result<Option<Money>, CanteenDbError> {
        Ok(self.db.fetch_student(student_id).await?.map(|s| s.balance))
    }

    /// Replays the full ledger against the cached balance. An audit/corrective tool — nothing in
    /// the engine calls this automatically.
    pub async fn reconcile(&self, student_id: &StudentId) -> Result<BalanceReconciliation, CanteenDbError> {
        self.db.reconcile_balance(student_id).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

//! Background closure of the window between a ledger submission and its
//! confirmation. Each pass appends a row per decided submission and never
//! touches existing rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use swiftclaim_chain::events::submission_outcome;
use swiftclaim_chain::{ClaimsLedger, ReceiptStatus, TransactionReceipt};
use swiftclaim_contracts::{AuditAction, TransactionStatus, TransactionType};
use swiftclaim_store::{
    AuditEntry, ClaimStore, NewClaimedTransaction, PendingSubmission, StoreError,
};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::orchestrator::{ENTITY_CLAIMS, ledger_outcome, observed_ledger_call};

pub const RECONCILER_ACTOR: &str = "system:reconciler";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub unconfirmed: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    store: ClaimStore,
    ledger: Arc<dyn ClaimsLedger>,
    batch_size: u32,
    /// Last pending row examined; the next pass scans past it and wraps to
    /// the start once a short batch shows the tail was reached.
    cursor: Arc<AtomicI64>,
}

impl Reconciler {
    pub fn new(store: ClaimStore, ledger: Arc<dyn ClaimsLedger>, batch_size: u32) -> Self {
        Self {
            store,
            ledger,
            batch_size: batch_size.max(1),
            cursor: Arc::new(AtomicI64::new(0)),
        }
    }

    /// One bounded batch. Ledger failures for a single submission are counted
    /// and left for the next pass; store failures abort the pass.
    pub async fn run_pass(&self) -> Result<ReconcileSummary, StoreError> {
        let span = tracing::info_span!(
            "reconcile.pass",
            examined = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let result = self.reconcile_batch().await;

            let span = tracing::Span::current();
            span.record("latency_ms", started.elapsed().as_millis() as u64);
            match &result {
                Ok(summary) => {
                    span.record("examined", summary.examined as u64);
                    span.record("outcome", "ok");
                }
                Err(_) => {
                    span.record("outcome", "store_error");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_batch(&self) -> Result<ReconcileSummary, StoreError> {
        let after = self.cursor.load(Ordering::Relaxed);
        let mut pending = self.store.pending_submissions(after, self.batch_size).await?;
        if pending.is_empty() && after > 0 {
            pending = self.store.pending_submissions(0, self.batch_size).await?;
        }
        let next = match pending.last() {
            Some(last) if pending.len() >= self.batch_size as usize => last.transaction_id,
            _ => 0,
        };
        self.cursor.store(next, Ordering::Relaxed);

        let mut summary = ReconcileSummary {
            examined: pending.len(),
            ..ReconcileSummary::default()
        };

        for submission in &pending {
            let receipt = observed_ledger_call(
                "getTransactionReceipt",
                self.ledger.transaction_receipt(&submission.transaction_hash),
            )
            .await;

            let outcome = match receipt {
                Ok(None) => {
                    summary.unconfirmed += 1;
                    "unconfirmed"
                }
                Ok(Some(receipt)) if receipt.status == ReceiptStatus::Success => {
                    self.record_confirmed(submission, &receipt).await?;
                    summary.confirmed += 1;
                    "confirmed"
                }
                Ok(Some(receipt)) => {
                    self.record_failed(submission, &receipt).await?;
                    summary.failed += 1;
                    "failed"
                }
                Err(err) => {
                    tracing::warn!(
                        claim_id = submission.claim_id,
                        transaction_hash = %submission.transaction_hash,
                        error = %err,
                        "reconcile.receipt_unavailable"
                    );
                    summary.errors += 1;
                    ledger_outcome(&err)
                }
            };
            crate::metrics::observe_reconciliation(outcome);
        }

        Ok(summary)
    }

    async fn record_confirmed(
        &self,
        submission: &PendingSubmission,
        receipt: &TransactionReceipt,
    ) -> Result<(), StoreError> {
        let ledger_claim_id = submission
            .ledger_claim_id
            .clone()
            .or_else(|| submission_outcome(receipt).chain_claim_id);
        let block = receipt
            .block_number
            .as_ref()
            .map_or("unknown", |b| b.as_str());

        let mut tx = self.store.begin().await?;
        tx.insert_claimed_transaction(&NewClaimedTransaction {
            claim_id: submission.claim_id,
            amount: submission.amount,
            transaction_hash: &submission.transaction_hash,
            transaction_type: TransactionType::Reconciliation,
            notes: format!("Ledger confirmed submission in block {}", block),
            status: TransactionStatus::Confirmed,
            ledger_claim_id: ledger_claim_id.as_ref(),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(
            claim_id = submission.claim_id,
            transaction_hash = %submission.transaction_hash,
            "reconcile.confirmed"
        );
        Ok(())
    }

    async fn record_failed(
        &self,
        submission: &PendingSubmission,
        receipt: &TransactionReceipt,
    ) -> Result<(), StoreError> {
        let reason = receipt.revert_reason.as_deref().unwrap_or("no reason given");

        let mut tx = self.store.begin().await?;
        tx.insert_claimed_transaction(&NewClaimedTransaction {
            claim_id: submission.claim_id,
            amount: submission.amount,
            transaction_hash: &submission.transaction_hash,
            transaction_type: TransactionType::Reconciliation,
            notes: format!("Ledger reverted submission: {}", reason),
            status: TransactionStatus::Failed,
            ledger_claim_id: submission.ledger_claim_id.as_ref(),
        })
        .await?;
        tx.insert_audit_entry(&AuditEntry {
            entity_type: ENTITY_CLAIMS,
            entity_id: submission.claim_id.to_string(),
            action: AuditAction::Reconcile,
            acting_user_id: RECONCILER_ACTOR,
            details: format!(
                "Ledger transaction {} reverted: {}",
                submission.transaction_hash, reason
            ),
        })
        .await?;
        tx.commit().await?;

        tracing::warn!(
            claim_id = submission.claim_id,
            transaction_hash = %submission.transaction_hash,
            reason,
            "reconcile.reverted"
        );
        Ok(())
    }

    /// Runs passes on `interval` until `shutdown` fires or its sender drops.
    pub fn spawn(
        self,
        interval: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_pass().await {
                            tracing::warn!(error = %err, "reconcile.pass_failed");
                        }
                    }
                }
            }
        })
    }
}

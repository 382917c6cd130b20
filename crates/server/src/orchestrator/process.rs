use std::time::Instant;

use swiftclaim_auth::Principal;
use swiftclaim_chain::ProcessingReceipt;
use swiftclaim_contracts::{Amount, AuditAction, LedgerUint, TransactionStatus, TransactionType};
use swiftclaim_store::{AuditEntry, ClaimRecord, NewClaimedTransaction, StoreError, StoreTx};
use tracing::Instrument;

use super::{
    ClaimError, ClaimOrchestrator, ENTITY_CLAIMS, abort, finish_operation, observed_ledger_call,
    parse_claim_id, possibly_applied, split_brain,
};

/// Ledger payout result, returned verbatim to the caller.
pub type ProcessedClaim = ProcessingReceipt;

impl ClaimOrchestrator {
    /// Settles a claim on the ledger. Amount and status are the contract's
    /// concern; the local row, when present, records the payout afterwards.
    pub async fn process_claim(
        &self,
        principal: &Principal,
        raw_claim_id: &str,
    ) -> Result<ProcessedClaim, ClaimError> {
        let span = tracing::info_span!(
            "claim.process",
            user_id = %principal.user_id,
            claim_id = %raw_claim_id,
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let result = self.process_claim_inner(principal, raw_claim_id).await;
            finish_operation("process", started, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn process_claim_inner(
        &self,
        principal: &Principal,
        raw_claim_id: &str,
    ) -> Result<ProcessedClaim, ClaimError> {
        let claim_id = parse_claim_id(raw_claim_id)?;
        let mut tx = self.store.begin().await?;

        let local = match tx.find_claim_for_update(claim_id).await {
            Ok(local) => local,
            Err(err) => return abort(tx, err.into()).await,
        };

        let recorded = match &local {
            Some(_) => match tx.ledger_claim_id(claim_id).await {
                Ok(recorded) => recorded,
                Err(err) => return abort(tx, err.into()).await,
            },
            None => None,
        };
        let ledger_claim_id =
            recorded.unwrap_or_else(|| LedgerUint::from(claim_id.unsigned_abs()));

        let receipt = match observed_ledger_call(
            "processClaim",
            self.ledger.process_claim(&ledger_claim_id),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(hash) = possibly_applied(&err) {
                    split_brain("process", hash, Some(claim_id), &err);
                }
                return abort(tx, err.into()).await;
            }
        };

        let Some(local) = local else {
            if let Err(err) = tx.rollback().await {
                tracing::warn!(error = %err, "claim.rollback_failed");
            }
            crate::metrics::inc_split_brain("process");
            tracing::warn!(
                claim_id,
                transaction_hash = %receipt.transaction_hash,
                "split_brain: processed ledger claim has no local row"
            );
            return Ok(receipt);
        };

        // The ledger payout is final; recording failures only reach the split-brain log.
        match record_settlement(&mut tx, principal, &local, &receipt).await {
            Ok(()) => match tx.commit().await {
                Ok(()) => tracing::info!(
                    claim_id,
                    paid_amount = receipt.paid_amount.as_str(),
                    transaction_hash = %receipt.transaction_hash,
                    "claim.processed"
                ),
                Err(err) => split_brain("process", &receipt.transaction_hash, Some(claim_id), &err),
            },
            Err(err) => {
                split_brain("process", &receipt.transaction_hash, Some(claim_id), &err);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "claim.rollback_failed");
                }
            }
        }

        Ok(receipt)
    }
}

async fn record_settlement(
    tx: &mut StoreTx,
    principal: &Principal,
    claim: &ClaimRecord,
    receipt: &ProcessingReceipt,
) -> Result<(), StoreError> {
    let paid = Amount::from_ledger_units(&receipt.paid_amount)
        .map_err(|err| StoreError::Decode(format!("paid amount: {}", err)))?;

    tx.mark_claim_paid(
        claim.claim_id,
        paid,
        &format!(
            "Claim processed on blockchain. Paid amount: {}. Transaction hash: {}",
            paid, receipt.transaction_hash
        ),
    )
    .await?;

    tx.insert_claimed_transaction(&NewClaimedTransaction {
        claim_id: claim.claim_id,
        amount: paid,
        transaction_hash: &receipt.transaction_hash,
        transaction_type: TransactionType::ClaimPayout,
        notes: format!("Claim payout processed on blockchain for chain claim {}", receipt.claim_id),
        status: TransactionStatus::Completed,
        ledger_claim_id: Some(&receipt.claim_id),
    })
    .await?;

    tx.insert_audit_entry(&AuditEntry {
        entity_type: ENTITY_CLAIMS,
        entity_id: claim.claim_id.to_string(),
        action: AuditAction::Process,
        acting_user_id: &principal.user_id,
        details: format!(
            "Claim paid {} on blockchain. TX: {}",
            paid, receipt.transaction_hash
        ),
    })
    .await
}

use std::time::Instant;

use serde::Serialize;
use swiftclaim_auth::Principal;
use swiftclaim_contracts::{AuditAction, ClaimStatus, ClaimType, LedgerUint};
use swiftclaim_store::{AuditEntry, ClaimRecord, StoreTx};
use tracing::Instrument;

use super::{
    ClaimError, ClaimOrchestrator, ENTITY_CLAIMS, abort, finish_operation, observed_ledger_call,
    parse_claim_id, possibly_applied, split_brain,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedClaim {
    pub claim_id: i64,
    pub transaction_hash: String,
}

impl ClaimOrchestrator {
    /// Moves a `pending` claim to `processing` once the ledger accepts the
    /// verification.
    pub async fn verify_claim(
        &self,
        principal: &Principal,
        raw_claim_id: &str,
    ) -> Result<VerifiedClaim, ClaimError> {
        let span = tracing::info_span!(
            "claim.verify",
            user_id = %principal.user_id,
            claim_id = %raw_claim_id,
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let result = self.verify_claim_inner(principal, raw_claim_id).await;
            finish_operation("verify", started, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn verify_claim_inner(
        &self,
        principal: &Principal,
        raw_claim_id: &str,
    ) -> Result<VerifiedClaim, ClaimError> {
        let claim_id = parse_claim_id(raw_claim_id)?;
        let mut tx = self.store.begin().await?;

        let claim = match tx.find_claim_for_update(claim_id).await {
            Ok(Some(claim)) if claim.status == ClaimStatus::Pending => claim,
            Ok(_) => {
                return abort(
                    tx,
                    ClaimError::ClaimNotEligible {
                        claim_id: raw_claim_id.to_string(),
                    },
                )
                .await;
            }
            Err(err) => return abort(tx, err.into()).await,
        };

        if let Err(err) = recheck_reference(&mut tx, &claim).await {
            return abort(tx, err).await;
        }

        let ledger_claim_id = match tx.ledger_claim_id(claim_id).await {
            Ok(Some(recorded)) => recorded,
            Ok(None) => LedgerUint::from(claim_id.unsigned_abs()),
            Err(err) => return abort(tx, err.into()).await,
        };

        let receipt = match observed_ledger_call(
            "verifyClaim",
            self.ledger.verify_claim(&ledger_claim_id),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(hash) = possibly_applied(&err) {
                    split_brain("verify", hash, Some(claim_id), &err);
                }
                return abort(tx, err.into()).await;
            }
        };

        let notes = format!(
            "Claim verified on blockchain. Transaction hash: {}",
            receipt.transaction_hash
        );
        if let Err(err) = tx.mark_claim_processing(claim_id, &notes).await {
            split_brain("verify", &receipt.transaction_hash, Some(claim_id), &err);
            return abort(tx, err.into()).await;
        }

        let audit = AuditEntry {
            entity_type: ENTITY_CLAIMS,
            entity_id: claim_id.to_string(),
            action: AuditAction::Verify,
            acting_user_id: &principal.user_id,
            details: format!(
                "Claim verified on blockchain. TX: {}",
                receipt.transaction_hash
            ),
        };
        if let Err(err) = tx.insert_audit_entry(&audit).await {
            split_brain("verify", &receipt.transaction_hash, Some(claim_id), &err);
            return abort(tx, err.into()).await;
        }

        if let Err(err) = tx.commit().await {
            split_brain("verify", &receipt.transaction_hash, Some(claim_id), &err);
            return Err(err.into());
        }

        tracing::info!(
            claim_id,
            transaction_hash = %receipt.transaction_hash,
            "claim.verified"
        );

        Ok(VerifiedClaim {
            claim_id,
            transaction_hash: receipt.transaction_hash,
        })
    }
}

/// Health claims must stay within the hospital bill; travel claims need
/// their flight row to still exist.
async fn recheck_reference(tx: &mut StoreTx, claim: &ClaimRecord) -> Result<(), ClaimError> {
    let reference = match claim.claim_type {
        ClaimType::Health => claim.aabha_id.as_deref(),
        ClaimType::Travel => claim.flight_id.as_deref(),
    };
    let not_found = || ClaimError::ReferenceNotFound {
        claim_type: claim.claim_type,
        reference: reference.unwrap_or_default().to_string(),
    };
    let Some(reference) = reference else {
        return Err(not_found());
    };

    match claim.claim_type {
        ClaimType::Health => {
            let record = tx.find_aabha_record(reference).await?.ok_or_else(not_found)?;
            if claim.claim_amount > record.bill_amount {
                return Err(ClaimError::BillAmountExceeded {
                    bill_amount: record.bill_amount,
                });
            }
        }
        ClaimType::Travel => {
            tx.find_flight(reference).await?.ok_or_else(not_found)?;
        }
    }
    Ok(())
}

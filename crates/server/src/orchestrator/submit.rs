use std::time::Instant;

use serde::Serialize;
use swiftclaim_auth::Principal;
use swiftclaim_chain::{SubmissionReceipt, SubmitClaimRequest};
use swiftclaim_contracts::{
    Amount, AuditAction, ClaimStatus, ClaimType, LedgerUint, TransactionStatus, TransactionType,
};
use swiftclaim_store::{AuditEntry, FlightRecord, NewClaim, NewClaimedTransaction, StoreTx};
use tracing::Instrument;

use super::validation::{ClaimSubmission, check_amount, check_presence, ledger_identifier};
use super::{
    ClaimError, ClaimOrchestrator, ENTITY_CLAIMS, abort, finish_operation, observed_ledger_call,
    possibly_applied, split_brain,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedClaim {
    pub claim_id: i64,
    pub policy_number: String,
    pub claim_amount: Amount,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
    pub ledger: SubmissionReceipt,
}

impl ClaimOrchestrator {
    pub async fn submit_claim(
        &self,
        principal: &Principal,
        submission: &ClaimSubmission,
    ) -> Result<SubmittedClaim, ClaimError> {
        let span = tracing::info_span!(
            "claim.submit",
            user_id = %principal.user_id,
            claim_id = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let result = self.submit_claim_inner(principal, submission).await;
            if let Ok(submitted) = &result {
                tracing::Span::current().record("claim_id", submitted.claim_id);
            }
            finish_operation("submit", started, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn submit_claim_inner(
        &self,
        principal: &Principal,
        submission: &ClaimSubmission,
    ) -> Result<SubmittedClaim, ClaimError> {
        let checked = check_presence(submission)?;

        let mut tx = self.store.begin().await?;

        let policy = match tx.find_active_policy(&checked.policy_number).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                return abort(
                    tx,
                    ClaimError::PolicyNotFound {
                        policy_number: checked.policy_number.clone(),
                    },
                )
                .await;
            }
            Err(err) => return abort(tx, err.into()).await,
        };

        let claim_type = checked.claim_type();

        match tx
            .try_lock_subscription(policy.user_id, policy.policy_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return abort(
                    tx,
                    ClaimError::SubmissionInProgress {
                        policy_number: checked.policy_number.clone(),
                    },
                )
                .await;
            }
            Err(err) => return abort(tx, err.into()).await,
        }

        match tx.find_active_claim(policy.user_id, policy.policy_id).await {
            Ok(Some(existing)) => {
                return abort(
                    tx,
                    ClaimError::DuplicateClaim {
                        existing_claim_id: existing.claim_id,
                        status: existing.status,
                    },
                )
                .await;
            }
            Ok(None) => {}
            Err(err) => return abort(tx, err.into()).await,
        }

        let claim_amount = match check_amount(&checked.claim_amount, policy.coverage) {
            Ok(amount) => amount,
            Err(err) => return abort(tx, err).await,
        };

        if claim_type != policy.policy_type {
            return abort(
                tx,
                ClaimError::ClaimTypeMismatch {
                    claim_type,
                    policy_type: policy.policy_type,
                },
            )
            .await;
        }

        let reference = match claim_type {
            ClaimType::Health => checked.aabha_id.as_deref(),
            ClaimType::Travel => checked.flight_id.as_deref(),
        };
        let Some(reference) = reference else {
            return abort(tx, ClaimError::MissingRequiredField(claim_type)).await;
        };

        let flight = match lookup_reference(&mut tx, claim_type, reference).await {
            Ok(flight) => flight,
            Err(err) => return abort(tx, err).await,
        };

        let ledger_request =
            match build_ledger_request(&checked, claim_amount, claim_type, flight.as_ref()) {
                Ok(request) => request,
                Err(err) => return abort(tx, err).await,
            };

        let new_claim = NewClaim {
            user_id: policy.user_id,
            policy_number: &policy.policy_number,
            policy_id: policy.policy_id,
            claim_type,
            claim_amount,
            incident_description: &checked.incident_description,
            bill_start_date: checked.bill_start_date,
            bill_end_date: checked.bill_end_date,
            aabha_id: (claim_type == ClaimType::Health).then_some(reference),
            flight_id: (claim_type == ClaimType::Travel).then_some(reference),
            status: self.initial_status,
        };

        let claim_id = match tx.insert_claim(&new_claim).await {
            Ok(claim_id) => claim_id,
            Err(err) if err.is_active_claim_conflict() => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "claim.rollback_failed");
                }
                return Err(self
                    .concurrent_duplicate(policy.user_id, policy.policy_id, err)
                    .await);
            }
            Err(err) => return abort(tx, err.into()).await,
        };

        let audit = AuditEntry {
            entity_type: ENTITY_CLAIMS,
            entity_id: claim_id.to_string(),
            action: AuditAction::Create,
            acting_user_id: &principal.user_id,
            details: format!(
                "Created {} claim for policy #{} with amount {}",
                claim_type.as_str(),
                policy.policy_number,
                claim_amount
            ),
        };
        if let Err(err) = tx.insert_audit_entry(&audit).await {
            return abort(tx, err.into()).await;
        }

        let receipt = match observed_ledger_call(
            "submitClaim",
            self.ledger.submit_claim(&ledger_request),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(hash) = possibly_applied(&err) {
                    split_brain("submit", hash, None, &err);
                }
                return abort(tx, err.into()).await;
            }
        };

        let record = NewClaimedTransaction {
            claim_id,
            amount: claim_amount,
            transaction_hash: &receipt.transaction_hash,
            transaction_type: TransactionType::ClaimPayout,
            notes: format!(
                "Initial claim submission for {} claim. Status: {}",
                claim_type.as_str(),
                receipt.status.as_str()
            ),
            status: TransactionStatus::Pending,
            ledger_claim_id: receipt.chain_claim_id.as_ref(),
        };
        if let Err(err) = tx.insert_claimed_transaction(&record).await {
            split_brain("submit", &receipt.transaction_hash, Some(claim_id), &err);
            return abort(tx, err.into()).await;
        }

        if let Err(err) = tx.commit().await {
            split_brain("submit", &receipt.transaction_hash, Some(claim_id), &err);
            return Err(err.into());
        }

        tracing::info!(
            claim_id,
            transaction_hash = %receipt.transaction_hash,
            blockchain_status = receipt.status.as_str(),
            "claim.submitted"
        );

        Ok(SubmittedClaim {
            claim_id,
            policy_number: policy.policy_number,
            claim_amount,
            claim_type,
            status: self.initial_status,
            ledger: receipt,
        })
    }

    /// Reads the claim that won the race for the active-claim index, using a
    /// fresh transaction since the losing one is aborted.
    async fn concurrent_duplicate(
        &self,
        user_id: i64,
        policy_id: i64,
        conflict: swiftclaim_store::StoreError,
    ) -> ClaimError {
        match self.active_claim(user_id, policy_id).await {
            Ok(Some(existing)) => ClaimError::DuplicateClaim {
                existing_claim_id: existing.claim_id,
                status: existing.status,
            },
            Ok(None) => ClaimError::Store(conflict),
            Err(err) => ClaimError::Store(err),
        }
    }
}

impl ClaimOrchestrator {
    async fn active_claim(
        &self,
        user_id: i64,
        policy_id: i64,
    ) -> Result<Option<swiftclaim_store::ActiveClaim>, swiftclaim_store::StoreError> {
        let mut tx = self.store.begin().await?;
        let winner = tx.find_active_claim(user_id, policy_id).await;
        tx.rollback().await?;
        winner
    }
}

/// Confirms the referenced record exists. Travel claims return their flight
/// row so its status can be forwarded to the ledger.
async fn lookup_reference(
    tx: &mut StoreTx,
    claim_type: ClaimType,
    reference: &str,
) -> Result<Option<FlightRecord>, ClaimError> {
    let not_found = || ClaimError::ReferenceNotFound {
        claim_type,
        reference: reference.to_string(),
    };

    match claim_type {
        ClaimType::Health => {
            tx.find_aabha_record(reference).await?.ok_or_else(not_found)?;
            Ok(None)
        }
        ClaimType::Travel => Ok(Some(tx.find_flight(reference).await?.ok_or_else(not_found)?)),
    }
}

fn build_ledger_request(
    checked: &super::validation::CheckedSubmission,
    claim_amount: Amount,
    claim_type: ClaimType,
    flight: Option<&FlightRecord>,
) -> Result<SubmitClaimRequest, ClaimError> {
    let policy_number = ledger_identifier("policyNumber", &checked.policy_number)?;
    let flight_id = match (claim_type, checked.flight_id.as_deref()) {
        (ClaimType::Travel, Some(flight_id)) => ledger_identifier("flightId", flight_id)?,
        _ => LedgerUint::zero(),
    };

    Ok(SubmitClaimRequest {
        policy_number,
        amount: claim_amount,
        treatment_type: checked.incident_description.clone(),
        aabha_id: match claim_type {
            ClaimType::Health => checked.aabha_id.clone().unwrap_or_default(),
            ClaimType::Travel => String::new(),
        },
        admission_timestamp: checked.bill_start_date.map(|d| d.timestamp()).unwrap_or(0),
        flight_id,
        flight_cancelled: flight.is_some_and(|f| f.is_cancelled),
        delay_minutes: flight.map_or(0, |f| f.delay_minutes),
        duration_minutes: flight.map_or(0, |f| f.duration_minutes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked(body: serde_json::Value) -> super::super::validation::CheckedSubmission {
        let submission: ClaimSubmission = serde_json::from_value(body).unwrap();
        check_presence(&submission).unwrap()
    }

    #[test]
    fn health_request_carries_aabha_and_admission_date() {
        let checked = checked(serde_json::json!({
            "policyNumber": "POL-1",
            "claimAmount": 30000,
            "incidentDescription": "Surgery",
            "aabhaId": "AABHA123",
            "billStartDate": "2024-01-01"
        }));

        let request =
            build_ledger_request(&checked, Amount::from_whole(30000), ClaimType::Health, None)
                .unwrap();

        assert_eq!(request.policy_number.as_str(), "1");
        assert_eq!(request.treatment_type, "Surgery");
        assert_eq!(request.aabha_id, "AABHA123");
        assert_eq!(request.admission_timestamp, 1_704_067_200);
        assert!(request.flight_id.is_zero());
        assert!(!request.flight_cancelled);
    }

    #[test]
    fn travel_request_forwards_flight_status() {
        let checked = checked(serde_json::json!({
            "policyNumber": "77",
            "claimAmount": "1200.50",
            "incidentDescription": "Cancelled flight",
            "flightId": "FL-202"
        }));
        let flight = FlightRecord {
            flight_id: "FL-202".to_string(),
            is_cancelled: true,
            delay_minutes: 185,
            duration_minutes: 140,
        };

        let request = build_ledger_request(
            &checked,
            Amount::parse("1200.50").unwrap(),
            ClaimType::Travel,
            Some(&flight),
        )
        .unwrap();

        assert_eq!(request.policy_number.as_str(), "77");
        assert_eq!(request.flight_id.as_str(), "202");
        assert_eq!(request.aabha_id, "");
        assert_eq!(request.admission_timestamp, 0);
        assert!(request.flight_cancelled);
        assert_eq!(request.delay_minutes, 185);
        assert_eq!(request.duration_minutes, 140);
    }

    #[test]
    fn unconvertible_policy_number_is_rejected() {
        let checked = checked(serde_json::json!({
            "policyNumber": "GOLD",
            "claimAmount": 10,
            "incidentDescription": "Surgery",
            "aabhaId": "AABHA123"
        }));
        let err = build_ledger_request(&checked, Amount::from_whole(10), ClaimType::Health, None)
            .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidIdentifier { field: "policyNumber", .. }));
    }
}

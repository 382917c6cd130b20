use swiftclaim_contracts::SubmissionStatus;

use crate::codec::uint_value;
use crate::{LedgerError, ProcessingReceipt, SubmissionReceipt, TransactionReceipt};

pub const CLAIM_SUBMITTED: &str = "ClaimSubmitted";
pub const CLAIM_PROCESSED: &str = "ClaimProcessed";

/// Classifies a confirmed submission. Missing events degrade the status but
/// never fail the call; the hash is always carried.
pub fn submission_outcome(receipt: &TransactionReceipt) -> SubmissionReceipt {
    let transaction_hash = receipt.transaction_hash.clone();

    if receipt.events.is_empty() {
        return SubmissionReceipt {
            transaction_hash,
            chain_claim_id: None,
            status: SubmissionStatus::SubmittedWithoutEvent,
        };
    }

    let Some(event) = receipt.events.iter().find(|e| e.event == CLAIM_SUBMITTED) else {
        return SubmissionReceipt {
            transaction_hash,
            chain_claim_id: None,
            status: SubmissionStatus::SubmittedWithoutSpecificEvent,
        };
    };

    match event.args.get("claimId").and_then(uint_value) {
        Some(claim_id) => SubmissionReceipt {
            transaction_hash,
            chain_claim_id: Some(claim_id),
            status: SubmissionStatus::SubmittedWithClaimId,
        },
        None => SubmissionReceipt {
            transaction_hash,
            chain_claim_id: None,
            status: SubmissionStatus::SubmittedWithoutClaimId,
        },
    }
}

pub fn processing_outcome(receipt: &TransactionReceipt) -> Result<ProcessingReceipt, LedgerError> {
    let missing = || LedgerError::MissingEvent {
        transaction_hash: receipt.transaction_hash.clone(),
        event: CLAIM_PROCESSED,
    };

    let event = receipt
        .events
        .iter()
        .find(|e| e.event == CLAIM_PROCESSED)
        .ok_or_else(missing)?;

    let claim_id = event.args.get("claimId").and_then(uint_value).ok_or_else(missing)?;
    let paid_amount = event
        .args
        .get("paidAmount")
        .and_then(uint_value)
        .ok_or_else(missing)?;

    Ok(ProcessingReceipt {
        claim_id,
        paid_amount,
        transaction_hash: receipt.transaction_hash.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerEvent, ReceiptStatus};

    fn receipt(events: Vec<LedgerEvent>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: "0xhash".to_string(),
            block_number: None,
            status: ReceiptStatus::Success,
            revert_reason: None,
            events,
        }
    }

    fn event(name: &str, args: serde_json::Value) -> LedgerEvent {
        LedgerEvent {
            event: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn submission_status_degrades_with_missing_data() {
        let none = submission_outcome(&receipt(Vec::new()));
        assert_eq!(none.status, SubmissionStatus::SubmittedWithoutEvent);
        assert_eq!(none.transaction_hash, "0xhash");

        let other = submission_outcome(&receipt(vec![event("Transfer", serde_json::json!({}))]));
        assert_eq!(other.status, SubmissionStatus::SubmittedWithoutSpecificEvent);

        let no_id = submission_outcome(&receipt(vec![event(
            CLAIM_SUBMITTED,
            serde_json::json!({"policyNumber": "1"}),
        )]));
        assert_eq!(no_id.status, SubmissionStatus::SubmittedWithoutClaimId);
        assert_eq!(no_id.chain_claim_id, None);

        let full = submission_outcome(&receipt(vec![
            event("Transfer", serde_json::json!({})),
            event(CLAIM_SUBMITTED, serde_json::json!({"claimId": "0x2a"})),
        ]));
        assert_eq!(full.status, SubmissionStatus::SubmittedWithClaimId);
        assert_eq!(full.chain_claim_id.unwrap().as_str(), "42");
    }

    #[test]
    fn processing_requires_claim_processed_event() {
        let err = processing_outcome(&receipt(Vec::new())).unwrap_err();
        assert!(matches!(err, LedgerError::MissingEvent { .. }));

        let ok = processing_outcome(&receipt(vec![event(
            CLAIM_PROCESSED,
            serde_json::json!({"claimId": 5, "paidAmount": "30000000000000000000000"}),
        )]))
        .unwrap();
        assert_eq!(ok.claim_id.as_str(), "5");
        assert_eq!(ok.paid_amount.as_str(), "30000000000000000000000");
    }
}

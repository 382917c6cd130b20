use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use swiftclaim_contracts::{Amount, ClaimStatus, ClaimType, SubmissionStatus};

use super::{ApiError, AppState, claim_error, extract_principal, invalid_body};
use crate::orchestrator::{ClaimSubmission, ProcessedClaim, SubmittedClaim};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmitClaimResponse {
    success: bool,
    claim: ClaimSummary,
    blockchain: BlockchainSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimSummary {
    claim_id: i64,
    policy_number: String,
    claim_amount: Amount,
    claim_type: ClaimType,
    status: ClaimStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockchainSummary {
    chain_claim_id: String,
    transaction_hash: String,
    blockchain_status: SubmissionStatus,
}

impl From<SubmittedClaim> for SubmitClaimResponse {
    fn from(value: SubmittedClaim) -> Self {
        let chain_claim_id = value
            .ledger
            .chain_claim_id
            .map_or_else(|| "0".to_string(), |id| id.to_string());

        SubmitClaimResponse {
            success: true,
            claim: ClaimSummary {
                claim_id: value.claim_id,
                policy_number: value.policy_number,
                claim_amount: value.claim_amount,
                claim_type: value.claim_type,
                status: value.status,
            },
            blockchain: BlockchainSummary {
                chain_claim_id,
                transaction_hash: value.ledger.transaction_hash,
                blockchain_status: value.ledger.status,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VerifyClaimResponse {
    success: bool,
    message: &'static str,
    claim_id: i64,
    transaction_hash: String,
}

pub(super) async fn submit_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<ClaimSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitClaimResponse>), ApiError> {
    let request_started = Instant::now();

    let handler_result: Result<_, ApiError> = (async {
        let principal = extract_principal(&state, &headers)?;
        let Json(req) = req.map_err(|_| invalid_body())?;

        let submitted = state
            .orchestrator
            .submit_claim(&principal, &req)
            .await
            .map_err(|err| claim_error(state.config.environment, "Error submitting claim", err))?;

        Ok((StatusCode::CREATED, Json(SubmitClaimResponse::from(submitted))))
    })
    .await;

    let status = match &handler_result {
        Ok((status, _)) => *status,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/claim",
        "POST",
        status.as_u16(),
        request_started.elapsed(),
    );

    handler_result
}

pub(super) async fn verify_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(claim_id): Path<String>,
) -> Result<Json<VerifyClaimResponse>, ApiError> {
    let request_started = Instant::now();

    let handler_result: Result<_, ApiError> = (async {
        let principal = extract_principal(&state, &headers)?;

        let verified = state
            .orchestrator
            .verify_claim(&principal, &claim_id)
            .await
            .map_err(|err| claim_error(state.config.environment, "Error verifying claim", err))?;

        Ok(Json(VerifyClaimResponse {
            success: true,
            message: "Claim verified successfully",
            claim_id: verified.claim_id,
            transaction_hash: verified.transaction_hash,
        }))
    })
    .await;

    let status = match &handler_result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/claim/{claimId}/verify",
        "POST",
        status.as_u16(),
        request_started.elapsed(),
    );

    handler_result
}

pub(super) async fn process_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(claim_id): Path<String>,
) -> Result<Json<ProcessedClaim>, ApiError> {
    let request_started = Instant::now();

    let handler_result: Result<_, ApiError> = (async {
        let principal = extract_principal(&state, &headers)?;

        let processed = state
            .orchestrator
            .process_claim(&principal, &claim_id)
            .await
            .map_err(|err| claim_error(state.config.environment, "Error processing claim", err))?;

        Ok(Json(processed))
    })
    .await;

    let status = match &handler_result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/claim/{claimId}/process",
        "POST",
        status.as_u16(),
        request_started.elapsed(),
    );

    handler_result
}

#[cfg(test)]
mod tests {
    use super::*;

    use swiftclaim_chain::SubmissionReceipt;
    use swiftclaim_contracts::LedgerUint;

    fn submitted(chain_claim_id: Option<LedgerUint>, status: SubmissionStatus) -> SubmittedClaim {
        SubmittedClaim {
            claim_id: 12,
            policy_number: "1001".to_string(),
            claim_amount: Amount::from_whole(5000),
            claim_type: ClaimType::Health,
            status: ClaimStatus::Approved,
            ledger: SubmissionReceipt {
                transaction_hash: "0xfeed".to_string(),
                chain_claim_id,
                status,
            },
        }
    }

    #[test]
    fn submit_response_reports_chain_claim_id() {
        let body = serde_json::to_value(SubmitClaimResponse::from(submitted(
            Some(LedgerUint::from(3u64)),
            SubmissionStatus::SubmittedWithClaimId,
        )))
        .expect("response serializes");

        assert_eq!(body["success"], true);
        assert_eq!(body["claim"]["claimId"], 12);
        assert_eq!(body["claim"]["claimType"], "health");
        assert_eq!(body["claim"]["status"], "approved");
        assert_eq!(body["blockchain"]["chainClaimId"], "3");
        assert_eq!(body["blockchain"]["transactionHash"], "0xfeed");
        assert_eq!(body["blockchain"]["blockchainStatus"], "submitted_with_claim_id");
    }

    #[test]
    fn unknown_chain_claim_id_is_reported_as_zero() {
        let body = serde_json::to_value(SubmitClaimResponse::from(submitted(
            None,
            SubmissionStatus::SubmittedWithoutEvent,
        )))
        .expect("response serializes");

        assert_eq!(body["blockchain"]["chainClaimId"], "0");
        assert_eq!(body["blockchain"]["blockchainStatus"], "submitted_without_event");
    }
}

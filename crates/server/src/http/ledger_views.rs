//! Pass-through reads of ledger state.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use swiftclaim_contracts::{LedgerClaim, LedgerPolicy, LedgerUint};

use super::{ApiError, AppState, claim_error, extract_principal, json_error};
use crate::orchestrator::{ClaimError, observed_ledger_call};

pub(super) async fn get_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(claim_id): Path<String>,
) -> Result<Json<LedgerClaim>, ApiError> {
    let request_started = Instant::now();

    let handler_result: Result<_, ApiError> = (async {
        extract_principal(&state, &headers)?;

        let claim_id = LedgerUint::parse_decimal(claim_id.trim()).map_err(|err| {
            json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_CLAIM_ID",
                "Invalid claim id",
                Some(format!("claim id {:?}: {}", claim_id, err)),
            )
        })?;

        let claim = observed_ledger_call(
            "getClaim",
            state.orchestrator.ledger().get_claim(&claim_id),
        )
        .await
        .map_err(|err| {
            claim_error(
                state.config.environment,
                "Error fetching claim",
                ClaimError::Ledger(err),
            )
        })?;

        Ok(Json(claim))
    })
    .await;

    let status = match &handler_result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/claim/{claimId}",
        "GET",
        status.as_u16(),
        request_started.elapsed(),
    );

    handler_result
}

pub(super) async fn get_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(policy_number): Path<String>,
) -> Result<Json<LedgerPolicy>, ApiError> {
    let request_started = Instant::now();

    let handler_result: Result<_, ApiError> = (async {
        extract_principal(&state, &headers)?;

        let policy_number = LedgerUint::from_identifier(&policy_number).map_err(|err| {
            json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_IDENTIFIER",
                "Invalid identifier",
                Some(format!("policy number {:?}: {}", policy_number, err)),
            )
        })?;

        let policy = observed_ledger_call(
            "getPolicy",
            state.orchestrator.ledger().get_policy(&policy_number),
        )
        .await
        .map_err(|err| {
            claim_error(
                state.config.environment,
                "Error fetching policy",
                ClaimError::Ledger(err),
            )
        })?;

        Ok(Json(policy))
    })
    .await;

    let status = match &handler_result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(
        "/policy/{policyNumber}",
        "GET",
        status.as_u16(),
        request_started.elapsed(),
    );

    handler_result
}

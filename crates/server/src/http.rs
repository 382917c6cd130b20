use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use swiftclaim_auth::{AuthError, JwtAuthenticator, JwtConfig, Principal};

use crate::config::{AuthMode, Environment, ServerConfig, StartupError};
use crate::orchestrator::{ClaimError, ClaimOrchestrator};

mod claims;
mod ledger_views;

#[derive(Clone)]
pub struct AppState {
    config: ServerConfig,
    orchestrator: ClaimOrchestrator,
    jwt: Option<JwtAuthenticator>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(
    config: ServerConfig,
    orchestrator: ClaimOrchestrator,
) -> Result<Router, StartupError> {
    let jwt = if config.auth_mode == AuthMode::Jwt {
        let secret = config.jwt_secret.clone().ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: "SWIFTCLAIM_AUTH_MODE=jwt requires SWIFTCLAIM_JWT_SECRET".to_string(),
        })?;

        Some(
            JwtAuthenticator::new(JwtConfig::hs256(secret)).map_err(|err| StartupError {
                code: err.code,
                message: err.message,
            })?,
        )
    } else {
        None
    };

    let state = AppState {
        config,
        orchestrator,
        jwt,
    };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/claim", post(claims::submit_claim))
        .route("/claim/{claimId}", get(ledger_views::get_claim))
        .route("/claim/{claimId}/verify", post(claims::verify_claim))
        .route("/claim/{claimId}/process", post(claims::process_claim))
        .route("/policy/{policyNumber}", get(ledger_views::get_policy))
        .with_state(state))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let postgres_ready = state.orchestrator.store().ping().await.is_ok();
    checks.insert("postgres", postgres_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if state.config.metrics_require_auth
        && let Err(err) = extract_principal(&state, &headers)
    {
        return err.into_response();
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn extract_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    match state.config.auth_mode {
        AuthMode::Local => swiftclaim_auth::local_principal(headers).map_err(auth_error),
        AuthMode::Jwt => {
            let Some(auth) = state.jwt.as_ref() else {
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERR_INTERNAL",
                    "jwt authenticator is not initialized",
                    None,
                ));
            };
            auth.authenticate(headers).map_err(auth_error)
        }
    }
}

fn auth_error(err: AuthError) -> ApiError {
    let status = match err.code {
        "ERR_AUTH_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNAUTHORIZED,
    };
    json_error(status, err.code, err.message, None)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    code: String,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_claim_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<Vec<String>>,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    error: impl Into<String>,
    details: Option<String>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            code: code.into(),
            error: error.into(),
            details,
            existing_claim_id: None,
            stack: None,
        }),
    )
}

fn invalid_body() -> ApiError {
    json_error(
        StatusCode::BAD_REQUEST,
        "ERR_INVALID_PARAMS",
        "Invalid request body",
        Some("request body must be a JSON object".to_string()),
    )
}

fn claim_status(err: &ClaimError) -> StatusCode {
    match err {
        ClaimError::MissingFields
        | ClaimError::InvalidBillDate { .. }
        | ClaimError::InvalidIdentifier { .. }
        | ClaimError::InvalidClaimAmount { .. }
        | ClaimError::InvalidClaimId(_)
        | ClaimError::ClaimTypeMismatch { .. }
        | ClaimError::MissingRequiredField(_)
        | ClaimError::BillAmountExceeded { .. } => StatusCode::BAD_REQUEST,
        ClaimError::PolicyNotFound { .. } | ClaimError::ReferenceNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ClaimError::DuplicateClaim { .. } | ClaimError::SubmissionInProgress { .. } => {
            StatusCode::CONFLICT
        }
        ClaimError::ClaimNotEligible { .. } | ClaimError::Ledger(_) | ClaimError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps an orchestrator failure onto the wire. `internal_message` names the
/// operation for failures that have no stable public wording.
fn claim_error(environment: Environment, internal_message: &str, err: ClaimError) -> ApiError {
    let status = claim_status(&err);
    let existing_claim_id = match &err {
        ClaimError::DuplicateClaim {
            existing_claim_id, ..
        } => Some(*existing_claim_id),
        _ => None,
    };
    let stack =
        (status.is_server_error() && !environment.is_production()).then(|| error_chain(&err));

    if status.is_server_error() {
        tracing::warn!(code = err.code(), error = %err, "claim.request_failed");
    }

    (
        status,
        Json(ErrorResponse {
            success: false,
            code: err.code().to_string(),
            error: err.public_message().unwrap_or(internal_message).to_string(),
            details: Some(err.details()),
            existing_claim_id,
            stack,
        }),
    )
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

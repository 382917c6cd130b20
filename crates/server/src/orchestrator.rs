use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use swiftclaim_chain::{ClaimsLedger, LedgerError};
use swiftclaim_contracts::{Amount, ClaimStatus, ClaimType};
use swiftclaim_store::{ClaimStore, StoreError, StoreTx};
use tracing::Instrument;

mod process;
mod submit;
mod validation;
mod verify;

pub use process::ProcessedClaim;
pub use submit::SubmittedClaim;
pub use validation::ClaimSubmission;
pub use verify::VerifiedClaim;

pub(crate) const ENTITY_CLAIMS: &str = "claims";

#[derive(Debug)]
pub enum ClaimError {
    MissingFields,
    InvalidBillDate {
        field: &'static str,
    },
    InvalidIdentifier {
        field: &'static str,
        value: String,
    },
    InvalidClaimAmount {
        coverage: Option<Amount>,
    },
    InvalidClaimId(String),
    PolicyNotFound {
        policy_number: String,
    },
    DuplicateClaim {
        existing_claim_id: i64,
        status: ClaimStatus,
    },
    /// Another submission for the same subscription holds its lock.
    SubmissionInProgress {
        policy_number: String,
    },
    ClaimTypeMismatch {
        claim_type: ClaimType,
        policy_type: ClaimType,
    },
    MissingRequiredField(ClaimType),
    ReferenceNotFound {
        claim_type: ClaimType,
        reference: String,
    },
    BillAmountExceeded {
        bill_amount: Amount,
    },
    ClaimNotEligible {
        claim_id: String,
    },
    Ledger(LedgerError),
    Store(StoreError),
}

impl ClaimError {
    pub fn code(&self) -> &'static str {
        match self {
            ClaimError::MissingFields => "ERR_MISSING_FIELDS",
            ClaimError::InvalidBillDate { .. } => "ERR_INVALID_BILL_DATE",
            ClaimError::InvalidIdentifier { .. } => "ERR_INVALID_IDENTIFIER",
            ClaimError::InvalidClaimAmount { .. } => "ERR_INVALID_CLAIM_AMOUNT",
            ClaimError::InvalidClaimId(_) => "ERR_INVALID_CLAIM_ID",
            ClaimError::PolicyNotFound { .. } => "ERR_POLICY_NOT_FOUND",
            ClaimError::DuplicateClaim { .. } | ClaimError::SubmissionInProgress { .. } => {
                "ERR_DUPLICATE_CLAIM"
            }
            ClaimError::ClaimTypeMismatch { .. } => "ERR_CLAIM_TYPE_MISMATCH",
            ClaimError::MissingRequiredField(_) => "ERR_MISSING_REQUIRED_FIELD",
            ClaimError::ReferenceNotFound { .. } => "ERR_REFERENCE_NOT_FOUND",
            ClaimError::BillAmountExceeded { .. } => "ERR_BILL_AMOUNT_EXCEEDED",
            ClaimError::ClaimNotEligible { .. } => "ERR_CLAIM_NOT_ELIGIBLE",
            ClaimError::Ledger(_) => "ERR_LEDGER",
            ClaimError::Store(_) => "ERR_STORE",
        }
    }

    /// Stable caller-facing error string. `None` for internal failures, which
    /// are worded per operation by the HTTP layer.
    pub fn public_message(&self) -> Option<&'static str> {
        let message = match self {
            ClaimError::MissingFields => "Missing required fields",
            ClaimError::InvalidBillDate { .. } => "Invalid bill date",
            ClaimError::InvalidIdentifier { .. } => "Invalid identifier",
            ClaimError::InvalidClaimAmount { .. } => "Invalid claim amount",
            ClaimError::InvalidClaimId(_) => "Invalid claim id",
            ClaimError::PolicyNotFound { .. } => "Policy not found or inactive",
            ClaimError::DuplicateClaim { .. } | ClaimError::SubmissionInProgress { .. } => {
                "Duplicate claim"
            }
            ClaimError::ClaimTypeMismatch { .. } => "Claim type mismatch",
            ClaimError::MissingRequiredField(ClaimType::Health) => "Missing AABHA ID",
            ClaimError::MissingRequiredField(ClaimType::Travel) => "Missing Flight ID",
            ClaimError::ReferenceNotFound {
                claim_type: ClaimType::Health,
                ..
            } => "AABHA record not found",
            ClaimError::ReferenceNotFound {
                claim_type: ClaimType::Travel,
                ..
            } => "Flight data not found",
            ClaimError::BillAmountExceeded { .. } => "Claim amount exceeds hospital bill amount",
            ClaimError::ClaimNotEligible { .. } => "Claim not found or not in pending status",
            ClaimError::Ledger(_) | ClaimError::Store(_) => return None,
        };
        Some(message)
    }

    pub fn details(&self) -> String {
        match self {
            ClaimError::MissingFields => {
                "Policy number, claim amount, and incident description are required".to_string()
            }
            ClaimError::InvalidBillDate { field } => {
                format!("{} must be YYYY-MM-DD or an RFC 3339 timestamp", field)
            }
            ClaimError::InvalidIdentifier { field, value } => {
                format!("{} {:?} cannot be represented as a ledger integer", field, value)
            }
            ClaimError::InvalidClaimAmount {
                coverage: Some(coverage),
            } => format!(
                "Claim amount must be greater than 0 and less than or equal to policy coverage ({})",
                coverage
            ),
            ClaimError::InvalidClaimAmount { coverage: None } => {
                "Claim amount must be a non-negative decimal number".to_string()
            }
            ClaimError::InvalidClaimId(raw) => {
                format!("Claim id {:?} must be a positive integer", raw)
            }
            ClaimError::PolicyNotFound { policy_number } => format!(
                "No active policy found with policy number: {}",
                policy_number
            ),
            ClaimError::DuplicateClaim {
                existing_claim_id,
                status,
            } => format!(
                "An active claim (ID: {}, Status: {}) already exists for this policy",
                existing_claim_id,
                status.as_str()
            ),
            ClaimError::SubmissionInProgress { policy_number } => format!(
                "A claim for policy {} is already being submitted",
                policy_number
            ),
            ClaimError::ClaimTypeMismatch {
                claim_type,
                policy_type,
            } => format!(
                "Cannot submit a {} claim for a {} policy",
                claim_type.as_str(),
                policy_type.as_str()
            ),
            ClaimError::MissingRequiredField(ClaimType::Health) => {
                "AABHA ID is required for health claims".to_string()
            }
            ClaimError::MissingRequiredField(ClaimType::Travel) => {
                "Flight ID is required for travel claims".to_string()
            }
            ClaimError::ReferenceNotFound {
                claim_type: ClaimType::Health,
                reference,
            } => format!("No AABHA record found with ID: {}", reference),
            ClaimError::ReferenceNotFound {
                claim_type: ClaimType::Travel,
                reference,
            } => format!("No flight data found with ID: {}", reference),
            ClaimError::BillAmountExceeded { bill_amount } => format!(
                "Claim amount must not exceed the hospital bill amount ({})",
                bill_amount
            ),
            ClaimError::ClaimNotEligible { claim_id } => {
                format!("Claim {} cannot be verified", claim_id)
            }
            ClaimError::Ledger(err) => err.to_string(),
            ClaimError::Store(err) => err.to_string(),
        }
    }
}

impl std::fmt::Display for ClaimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.public_message() {
            Some(message) => write!(f, "{}: {}", message, self.details()),
            None => write!(f, "{}", self.details()),
        }
    }
}

impl std::error::Error for ClaimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClaimError::Ledger(err) => Some(err),
            ClaimError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LedgerError> for ClaimError {
    fn from(value: LedgerError) -> Self {
        ClaimError::Ledger(value)
    }
}

impl From<StoreError> for ClaimError {
    fn from(value: StoreError) -> Self {
        ClaimError::Store(value)
    }
}

/// Runs the claim lifecycle against the relational store and the ledger.
#[derive(Clone)]
pub struct ClaimOrchestrator {
    store: ClaimStore,
    ledger: Arc<dyn ClaimsLedger>,
    initial_status: ClaimStatus,
}

impl ClaimOrchestrator {
    pub fn new(
        store: ClaimStore,
        ledger: Arc<dyn ClaimsLedger>,
        initial_status: ClaimStatus,
    ) -> Self {
        Self {
            store,
            ledger,
            initial_status,
        }
    }

    pub fn store(&self) -> &ClaimStore {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn ClaimsLedger> {
        &self.ledger
    }
}

/// Parses a path claim id into the local `BIGSERIAL` space.
pub fn parse_claim_id(raw: &str) -> Result<i64, ClaimError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ClaimError::InvalidClaimId(raw.to_string()))
}

/// Rolls back and hands the original error through; a failed rollback is only
/// logged since the connection is discarded either way.
async fn abort<T>(tx: StoreTx, err: ClaimError) -> Result<T, ClaimError> {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "claim.rollback_failed");
    }
    Err(err)
}

fn split_brain(
    operation: &'static str,
    transaction_hash: &str,
    claim_id: Option<i64>,
    err: &dyn std::fmt::Display,
) {
    crate::metrics::inc_split_brain(operation);
    tracing::error!(
        operation,
        transaction_hash,
        claim_id,
        error = %err,
        "split_brain"
    );
}

/// Hash of a write the ledger may have applied even though the call failed.
fn possibly_applied(err: &LedgerError) -> Option<&str> {
    match err {
        LedgerError::ConfirmationTimeout { transaction_hash }
        | LedgerError::MissingEvent {
            transaction_hash, ..
        }
        | LedgerError::ReceiptUnavailable {
            transaction_hash, ..
        } => Some(transaction_hash),
        _ => None,
    }
}

pub(crate) fn ledger_outcome(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::Timeout => "timeout",
        LedgerError::Transport(_) => "transport_error",
        LedgerError::Rpc { .. } => "rpc_error",
        LedgerError::InvalidResponse(_) => "invalid_response",
        LedgerError::Signing(_) => "signing_error",
        LedgerError::SignerUnavailable => "signer_unavailable",
        LedgerError::Reverted { .. } => "reverted",
        LedgerError::ConfirmationTimeout { .. } => "confirmation_timeout",
        LedgerError::MissingEvent { .. } => "missing_event",
        LedgerError::ReceiptUnavailable { .. } => "receipt_unavailable",
    }
}

/// Wraps one ledger call in a `ledger.call` span and records its latency.
pub(crate) async fn observed_ledger_call<T, F>(
    function: &'static str,
    call: F,
) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    let span = tracing::info_span!(
        "ledger.call",
        function,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    async move {
        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => ledger_outcome(err),
        };

        tracing::Span::current().record("latency_ms", elapsed.as_millis() as u64);
        tracing::Span::current().record("outcome", outcome);
        crate::metrics::observe_ledger_call(function, outcome, elapsed);
        result
    }
    .instrument(span)
    .await
}

/// Records the operation span fields and the outcome counter.
fn finish_operation<T>(operation: &'static str, started: Instant, result: &Result<T, ClaimError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    };
    tracing::Span::current().record("latency_ms", started.elapsed().as_millis() as u64);
    tracing::Span::current().record("outcome", outcome);
    crate::metrics::observe_claim_outcome(operation, outcome);
}

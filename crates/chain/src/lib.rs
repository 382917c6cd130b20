use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use swiftclaim_contracts::{Amount, LedgerClaim, LedgerPolicy, LedgerUint, SubmissionStatus};

mod client;
pub mod codec;
pub mod events;
mod signer;

pub use client::{RpcLedgerClient, RpcLedgerConfig};
pub use signer::TransactionSigner;

#[derive(Debug)]
pub enum LedgerError {
    Timeout,
    Transport(reqwest::Error),
    Rpc { code: i64, message: String },
    InvalidResponse(String),
    Signing(String),
    SignerUnavailable,
    Reverted {
        transaction_hash: String,
        reason: Option<String>,
    },
    ConfirmationTimeout { transaction_hash: String },
    MissingEvent {
        transaction_hash: String,
        event: &'static str,
    },
    /// The transaction was sent but polling for its receipt failed.
    ReceiptUnavailable {
        transaction_hash: String,
        source: Box<LedgerError>,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Timeout => write!(f, "ledger rpc timed out"),
            LedgerError::Transport(err) => write!(f, "ledger transport error: {}", err),
            LedgerError::Rpc { code, message } => {
                write!(f, "ledger rpc error {}: {}", code, message)
            }
            LedgerError::InvalidResponse(msg) => {
                write!(f, "ledger returned invalid response: {}", msg)
            }
            LedgerError::Signing(msg) => write!(f, "ledger signing failed: {}", msg),
            LedgerError::SignerUnavailable => write!(f, "ledger signing key is not configured"),
            LedgerError::Reverted {
                transaction_hash,
                reason,
            } => write!(
                f,
                "ledger transaction {} reverted: {}",
                transaction_hash,
                reason.as_deref().unwrap_or("no reason given")
            ),
            LedgerError::ConfirmationTimeout { transaction_hash } => write!(
                f,
                "ledger transaction {} was not confirmed in time",
                transaction_hash
            ),
            LedgerError::MissingEvent {
                transaction_hash,
                event,
            } => write!(
                f,
                "ledger transaction {} emitted no {} event",
                transaction_hash, event
            ),
            LedgerError::ReceiptUnavailable {
                transaction_hash,
                source,
            } => write!(
                f,
                "ledger transaction {} receipt unavailable: {}",
                transaction_hash, source
            ),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Transport(err) => Some(err),
            LedgerError::ReceiptUnavailable { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            LedgerError::Timeout
        } else {
            LedgerError::Transport(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitClaimRequest {
    pub policy_number: LedgerUint,
    pub amount: Amount,
    pub treatment_type: String,
    pub aabha_id: String,
    /// Epoch seconds; zero when unknown.
    pub admission_timestamp: i64,
    pub flight_id: LedgerUint,
    pub flight_cancelled: bool,
    pub delay_minutes: u32,
    pub duration_minutes: u32,
}

impl SubmitClaimRequest {
    pub fn to_args(&self) -> serde_json::Value {
        serde_json::json!([
            self.policy_number.as_str(),
            self.amount.to_ledger_units().as_str(),
            self.treatment_type,
            self.aabha_id,
            self.admission_timestamp.max(0).to_string(),
            self.flight_id.as_str(),
            self.flight_cancelled,
            self.delay_minutes,
            self.duration_minutes,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub transaction_hash: String,
    pub chain_claim_id: Option<LedgerUint>,
    pub status: SubmissionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReceipt {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReceipt {
    pub claim_id: LedgerUint,
    /// Base units, as emitted by the ledger.
    pub paid_amount: LedgerUint,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<LedgerUint>,
    pub status: ReceiptStatus,
    pub revert_reason: Option<String>,
    pub events: Vec<LedgerEvent>,
}

/// Claims-settlement contract as seen by the orchestrators.
#[async_trait]
pub trait ClaimsLedger: Send + Sync {
    async fn get_policy(&self, policy_number: &LedgerUint) -> Result<LedgerPolicy, LedgerError>;

    async fn get_claim(&self, claim_id: &LedgerUint) -> Result<LedgerClaim, LedgerError>;

    async fn submit_claim(
        &self,
        request: &SubmitClaimRequest,
    ) -> Result<SubmissionReceipt, LedgerError>;

    async fn verify_claim(&self, claim_id: &LedgerUint) -> Result<VerificationReceipt, LedgerError>;

    async fn process_claim(&self, claim_id: &LedgerUint) -> Result<ProcessingReceipt, LedgerError>;

    /// `None` while the transaction is unconfirmed.
    async fn transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError>;
}

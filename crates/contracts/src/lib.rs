use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod amount;
pub mod canonical;
pub mod ledger_uint;

pub use amount::{Amount, ParseAmountError};
pub use ledger_uint::{LedgerUint, ParseUintError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Health,
    Travel,
}

impl ClaimType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimType::Health => "health",
            ClaimType::Travel => "travel",
        }
    }
}

impl FromStr for ClaimType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(ClaimType::Health),
            "travel" => Ok(ClaimType::Travel),
            _ => Err(UnknownVariant {
                kind: "claim type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    Paid,
}

impl ClaimStatus {
    /// Statuses that block a second claim on the same `(user, policy)` pair.
    pub const ACTIVE: [ClaimStatus; 3] = [
        ClaimStatus::Pending,
        ClaimStatus::Processing,
        ClaimStatus::Approved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Processing => "processing",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Paid => "paid",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

impl FromStr for ClaimStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "processing" => Ok(ClaimStatus::Processing),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            "paid" => Ok(ClaimStatus::Paid),
            _ => Err(UnknownVariant {
                kind: "claim status",
                value: s.to_string(),
            }),
        }
    }
}

/// How the ledger acknowledged a submission. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    SubmittedWithClaimId,
    SubmittedWithoutEvent,
    SubmittedWithoutSpecificEvent,
    SubmittedWithoutClaimId,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::SubmittedWithClaimId => "submitted_with_claim_id",
            SubmissionStatus::SubmittedWithoutEvent => "submitted_without_event",
            SubmissionStatus::SubmittedWithoutSpecificEvent => "submitted_without_specific_event",
            SubmissionStatus::SubmittedWithoutClaimId => "submitted_without_claim_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    ClaimPayout,
    Reconciliation,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::ClaimPayout => "claim_payout",
            TransactionType::Reconciliation => "reconciliation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Verify,
    Process,
    Reconcile,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Verify => "VERIFY",
            AuditAction::Process => "PROCESS",
            AuditAction::Reconcile => "RECONCILE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerClaim {
    pub policy_number: LedgerUint,
    pub policyholder: String,
    pub amount: Amount,
    pub treatment_type: String,
    pub timestamp: DateTime<Utc>,
    pub is_verified: bool,
    pub is_paid: bool,
    pub paid_amount: Amount,
    pub aabha_id: String,
    pub admission_date: DateTime<Utc>,
    pub flight_id: LedgerUint,
    pub is_cancelled: bool,
    pub delay_minutes: u64,
    pub duration_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPolicy {
    pub policyholder: String,
    pub coverage_amount: Amount,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub policy_type: String,
    pub is_active: bool,
}

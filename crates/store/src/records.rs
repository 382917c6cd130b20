use chrono::{DateTime, Utc};
use swiftclaim_contracts::{
    Amount, AuditAction, ClaimStatus, ClaimType, LedgerUint, TransactionStatus, TransactionType,
};

/// Active subscription joined with its product and owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub policy_id: i64,
    pub policy_number: String,
    pub user_id: i64,
    pub policy_type: ClaimType,
    pub coverage: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveClaim {
    pub claim_id: i64,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AabhaRecord {
    pub aabha_id: String,
    pub bill_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightRecord {
    pub flight_id: String,
    pub is_cancelled: bool,
    pub delay_minutes: u32,
    pub duration_minutes: u32,
}

pub struct NewClaim<'a> {
    pub user_id: i64,
    pub policy_number: &'a str,
    pub policy_id: i64,
    pub claim_type: ClaimType,
    pub claim_amount: Amount,
    pub incident_description: &'a str,
    pub bill_start_date: Option<DateTime<Utc>>,
    pub bill_end_date: Option<DateTime<Utc>>,
    pub aabha_id: Option<&'a str>,
    pub flight_id: Option<&'a str>,
    pub status: ClaimStatus,
}

/// Claim row as read under `FOR UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    pub claim_id: i64,
    pub claim_type: ClaimType,
    pub claim_amount: Amount,
    pub aabha_id: Option<String>,
    pub flight_id: Option<String>,
    pub status: ClaimStatus,
}

pub struct AuditEntry<'a> {
    pub entity_type: &'a str,
    pub entity_id: String,
    pub action: AuditAction,
    pub acting_user_id: &'a str,
    pub details: String,
}

pub struct NewClaimedTransaction<'a> {
    pub claim_id: i64,
    pub amount: Amount,
    pub transaction_hash: &'a str,
    pub transaction_type: TransactionType,
    pub notes: String,
    pub status: TransactionStatus,
    pub ledger_claim_id: Option<&'a LedgerUint>,
}

/// A claim whose newest `claimed_transactions` row is still `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    /// Id of the pending row itself; the reconciler's scan cursor.
    pub transaction_id: i64,
    pub claim_id: i64,
    pub transaction_hash: String,
    pub amount: Amount,
    pub ledger_claim_id: Option<LedgerUint>,
}

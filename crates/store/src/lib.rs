use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use swiftclaim_contracts::{Amount, ClaimStatus, ClaimType, LedgerUint};

mod records;

pub use records::{
    AabhaRecord, ActiveClaim, AuditEntry, ClaimRecord, FlightRecord, NewClaim,
    NewClaimedTransaction, PendingSubmission, PolicyRecord,
};

const ACTIVE_CLAIM_INDEX: &str = "claims_one_active_per_policy";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    Sqlx(sqlx::Error),
    Decode(String),
}

impl StoreError {
    /// True when the insert lost the race for the one-active-claim index.
    pub fn is_active_claim_conflict(&self) -> bool {
        match self {
            StoreError::Sqlx(sqlx::Error::Database(db)) => {
                db.is_unique_violation() && db.constraint() == Some(ACTIVE_CLAIM_INDEX)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
            StoreError::Decode(msg) => write!(f, "store decode error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(StoreError::from)
}

/// Relational system of record for policies, claims and their audit trail.
#[derive(Clone)]
pub struct ClaimStore {
    pool: sqlx::PgPool,
    query_timeout: Duration,
}

impl ClaimStore {
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            Duration::from_secs(2),
            PgPoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self {
            pool,
            query_timeout,
        })
    }

    pub async fn connect_and_migrate(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, max_connections, query_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        bounded(
            self.query_timeout,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        let tx = bounded(self.query_timeout, self.pool.begin()).await?;
        Ok(StoreTx {
            tx,
            query_timeout: self.query_timeout,
        })
    }

    /// Claims whose newest transaction row is still `pending` and newer than
    /// `after`, in row order.
    pub async fn pending_submissions(
        &self,
        after: i64,
        limit: u32,
    ) -> Result<Vec<PendingSubmission>, StoreError> {
        let rows = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT transaction_id, claim_id, transaction_hash, amount, ledger_claim_id FROM (
                    SELECT DISTINCT ON (claim_id)
                        claim_id, transaction_id, transaction_hash,
                        amount::text AS amount, ledger_claim_id, status
                    FROM claimed_transactions
                    ORDER BY claim_id, transaction_id DESC
                 ) latest
                 WHERE status = 'pending' AND transaction_id > $1
                 ORDER BY transaction_id ASC
                 LIMIT $2",
            )
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| -> Result<PendingSubmission, StoreError> {
                Ok(PendingSubmission {
                    transaction_id: row.try_get("transaction_id")?,
                    claim_id: row.try_get("claim_id")?,
                    transaction_hash: row.try_get("transaction_hash")?,
                    amount: decode_amount(row, "amount")?,
                    ledger_claim_id: decode_ledger_uint(row, "ledger_claim_id")?,
                })
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One request-scoped unit of work. Dropping without `commit` rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Postgres>,
    query_timeout: Duration,
}

impl StoreTx {
    pub async fn commit(self) -> Result<(), StoreError> {
        bounded(self.query_timeout, self.tx.commit()).await
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        bounded(self.query_timeout, self.tx.rollback()).await
    }

    pub async fn find_active_policy(
        &mut self,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT sp.policy_id, sp.policy_number, u.user_id, ip.type, ip.coverage::text AS coverage
                 FROM subscribed_policies sp
                 JOIN insurance_policies ip ON sp.policy_id = ip.policy_id
                 JOIN users u ON sp.user_id = u.user_id
                 WHERE sp.policy_number = $1 AND sp.status = 'active'",
            )
            .bind(policy_number)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(PolicyRecord {
            policy_id: row.try_get("policy_id")?,
            policy_number: row.try_get("policy_number")?,
            user_id: row.try_get("user_id")?,
            policy_type: decode_claim_type(&row, "type")?,
            coverage: decode_amount(&row, "coverage")?,
        }))
    }

    /// Takes the subscription row lock for `(user_id, policy_id)` without
    /// waiting. `false` means another transaction holds it.
    pub async fn try_lock_subscription(
        &mut self,
        user_id: i64,
        policy_id: i64,
    ) -> Result<bool, StoreError> {
        let result = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT subscription_id FROM subscribed_policies
                 WHERE user_id = $1 AND policy_id = $2
                 FOR UPDATE NOWAIT",
            )
            .bind(user_id)
            .bind(policy_id)
            .fetch_all(&mut *self.tx),
        )
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(StoreError::Sqlx(sqlx::Error::Database(db)))
                if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) =>
            {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn find_active_claim(
        &mut self,
        user_id: i64,
        policy_id: i64,
    ) -> Result<Option<ActiveClaim>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT claim_id, claim_status FROM claims
                 WHERE user_id = $1 AND policy_id = $2 AND claim_status IN ('pending', 'processing', 'approved')
                 ORDER BY claim_id ASC
                 LIMIT 1",
            )
            .bind(user_id)
            .bind(policy_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ActiveClaim {
            claim_id: row.try_get("claim_id")?,
            status: decode_claim_status(&row, "claim_status")?,
        }))
    }

    pub async fn find_aabha_record(
        &mut self,
        aabha_id: &str,
    ) -> Result<Option<AabhaRecord>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT aabha_id, bill_amount::text AS bill_amount
                 FROM aabha_records WHERE aabha_id = $1",
            )
            .bind(aabha_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AabhaRecord {
            aabha_id: row.try_get("aabha_id")?,
            bill_amount: decode_amount(&row, "bill_amount")?,
        }))
    }

    pub async fn find_flight(
        &mut self,
        flight_id: &str,
    ) -> Result<Option<FlightRecord>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT flight_id, is_cancelled, delay_minutes, duration_minutes
                 FROM flight_data WHERE flight_id = $1",
            )
            .bind(flight_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(FlightRecord {
            flight_id: row.try_get("flight_id")?,
            is_cancelled: row.try_get("is_cancelled")?,
            delay_minutes: decode_minutes(&row, "delay_minutes")?,
            duration_minutes: decode_minutes(&row, "duration_minutes")?,
        }))
    }

    pub async fn insert_claim(&mut self, claim: &NewClaim<'_>) -> Result<i64, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "INSERT INTO claims (
                    user_id, policy_number, policy_id, incident_description, claim_amount,
                    bill_start_date, bill_end_date, aabha_id, flight_id, claim_type, claim_status
                 )
                 VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10, $11)
                 RETURNING claim_id",
            )
            .bind(claim.user_id)
            .bind(claim.policy_number)
            .bind(claim.policy_id)
            .bind(claim.incident_description)
            .bind(claim.claim_amount.to_string())
            .bind(claim.bill_start_date)
            .bind(claim.bill_end_date)
            .bind(claim.aabha_id)
            .bind(claim.flight_id)
            .bind(claim.claim_type.as_str())
            .bind(claim.status.as_str())
            .fetch_one(&mut *self.tx),
        )
        .await?;

        Ok(row.try_get("claim_id")?)
    }

    pub async fn insert_audit_entry(&mut self, entry: &AuditEntry<'_>) -> Result<(), StoreError> {
        bounded(
            self.query_timeout,
            sqlx::query(
                "INSERT INTO audit_log (entity_type, entity_id, action, acting_user_id, details)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(entry.entity_type)
            .bind(&entry.entity_id)
            .bind(entry.action.as_str())
            .bind(entry.acting_user_id)
            .bind(&entry.details)
            .execute(&mut *self.tx),
        )
        .await?;
        Ok(())
    }

    pub async fn insert_claimed_transaction(
        &mut self,
        record: &NewClaimedTransaction<'_>,
    ) -> Result<i64, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "INSERT INTO claimed_transactions (
                    claim_id, amount, transaction_hash, transaction_type, notes, status, ledger_claim_id
                 )
                 VALUES ($1, $2::numeric, $3, $4, $5, $6, $7)
                 RETURNING transaction_id",
            )
            .bind(record.claim_id)
            .bind(record.amount.to_string())
            .bind(record.transaction_hash)
            .bind(record.transaction_type.as_str())
            .bind(&record.notes)
            .bind(record.status.as_str())
            .bind(record.ledger_claim_id.map(LedgerUint::as_str))
            .fetch_one(&mut *self.tx),
        )
        .await?;

        Ok(row.try_get("transaction_id")?)
    }

    /// Locks the claim row for the rest of the transaction.
    pub async fn find_claim_for_update(
        &mut self,
        claim_id: i64,
    ) -> Result<Option<ClaimRecord>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT claim_id, claim_type, claim_amount::text AS claim_amount,
                        aabha_id, flight_id, claim_status
                 FROM claims WHERE claim_id = $1
                 FOR UPDATE",
            )
            .bind(claim_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ClaimRecord {
            claim_id: row.try_get("claim_id")?,
            claim_type: decode_claim_type(&row, "claim_type")?,
            claim_amount: decode_amount(&row, "claim_amount")?,
            aabha_id: row.try_get("aabha_id")?,
            flight_id: row.try_get("flight_id")?,
            status: decode_claim_status(&row, "claim_status")?,
        }))
    }

    /// Most recent on-chain id recorded for the claim, if the ledger ever reported one.
    pub async fn ledger_claim_id(
        &mut self,
        claim_id: i64,
    ) -> Result<Option<LedgerUint>, StoreError> {
        let row = bounded(
            self.query_timeout,
            sqlx::query(
                "SELECT ledger_claim_id FROM claimed_transactions
                 WHERE claim_id = $1 AND ledger_claim_id IS NOT NULL
                 ORDER BY transaction_id DESC
                 LIMIT 1",
            )
            .bind(claim_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        match row {
            Some(row) => decode_ledger_uint(&row, "ledger_claim_id"),
            None => Ok(None),
        }
    }

    pub async fn mark_claim_processing(
        &mut self,
        claim_id: i64,
        notes: &str,
    ) -> Result<(), StoreError> {
        self.update_claim_status(claim_id, ClaimStatus::Processing, None, notes)
            .await
    }

    pub async fn mark_claim_paid(
        &mut self,
        claim_id: i64,
        approved_amount: Amount,
        notes: &str,
    ) -> Result<(), StoreError> {
        self.update_claim_status(claim_id, ClaimStatus::Paid, Some(approved_amount), notes)
            .await
    }

    async fn update_claim_status(
        &mut self,
        claim_id: i64,
        status: ClaimStatus,
        approved_amount: Option<Amount>,
        notes: &str,
    ) -> Result<(), StoreError> {
        let result = bounded(
            self.query_timeout,
            sqlx::query(
                "UPDATE claims
                 SET claim_status = $1,
                     approved_amount = COALESCE($2::numeric, approved_amount),
                     processing_notes = $3,
                     updated_at = now()
                 WHERE claim_id = $4",
            )
            .bind(status.as_str())
            .bind(approved_amount.map(|a| a.to_string()))
            .bind(notes)
            .bind(claim_id)
            .execute(&mut *self.tx),
        )
        .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Decode(format!(
                "claim {} vanished during status update",
                claim_id
            )));
        }
        Ok(())
    }
}

fn decode_amount(row: &PgRow, column: &str) -> Result<Amount, StoreError> {
    let raw: String = row.try_get(column)?;
    Amount::parse(&raw).map_err(|err| StoreError::Decode(format!("{}: {}", column, err)))
}

fn decode_ledger_uint(row: &PgRow, column: &str) -> Result<Option<LedgerUint>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        LedgerUint::parse_decimal(&raw)
            .map_err(|err| StoreError::Decode(format!("{}: {}", column, err)))
    })
    .transpose()
}

fn decode_claim_type(row: &PgRow, column: &str) -> Result<ClaimType, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|err| StoreError::Decode(format!("{}: {}", column, err)))
}

fn decode_claim_status(row: &PgRow, column: &str) -> Result<ClaimStatus, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|err| StoreError::Decode(format!("{}: {}", column, err)))
}

fn decode_minutes(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let raw: i32 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| StoreError::Decode(format!("{}: negative minutes", column)))
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_not_an_active_claim_conflict() {
        assert!(!StoreError::Timeout.is_active_claim_conflict());
        assert!(!StoreError::Decode("x".to_string()).is_active_claim_conflict());
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let err = bounded(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<(), sqlx::Error>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
    }
}

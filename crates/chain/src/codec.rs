//! Positional tuple decoding for contract read calls.

use chrono::{DateTime, Utc};
use serde_json::Value;
use swiftclaim_contracts::{Amount, LedgerClaim, LedgerPolicy, LedgerUint};

use crate::LedgerError;

const POLICY_FIELDS: usize = 6;
const CLAIM_FIELDS: usize = 14;

/// `getPolicy` → `(policyholder, coverageAmount, startDate, endDate, policyType, isActive)`.
pub fn decode_policy(values: &[Value]) -> Result<LedgerPolicy, LedgerError> {
    expect_len(values, POLICY_FIELDS, "getPolicy")?;
    Ok(LedgerPolicy {
        policyholder: string_at(values, 0)?,
        coverage_amount: amount_at(values, 1)?,
        start_date: timestamp_at(values, 2)?,
        end_date: timestamp_at(values, 3)?,
        policy_type: string_at(values, 4)?,
        is_active: bool_at(values, 5)?,
    })
}

pub fn decode_claim(values: &[Value]) -> Result<LedgerClaim, LedgerError> {
    expect_len(values, CLAIM_FIELDS, "getClaim")?;
    Ok(LedgerClaim {
        policy_number: uint_at(values, 0)?,
        policyholder: string_at(values, 1)?,
        amount: amount_at(values, 2)?,
        treatment_type: string_at(values, 3)?,
        timestamp: timestamp_at(values, 4)?,
        is_verified: bool_at(values, 5)?,
        is_paid: bool_at(values, 6)?,
        paid_amount: amount_at(values, 7)?,
        aabha_id: string_at(values, 8)?,
        admission_date: timestamp_at(values, 9)?,
        flight_id: uint_at(values, 10)?,
        is_cancelled: bool_at(values, 11)?,
        delay_minutes: u64_at(values, 12)?,
        duration_minutes: u64_at(values, 13)?,
    })
}

fn expect_len(values: &[Value], expected: usize, function: &str) -> Result<(), LedgerError> {
    if values.len() < expected {
        return Err(LedgerError::InvalidResponse(format!(
            "{} returned {} fields, expected {}",
            function,
            values.len(),
            expected
        )));
    }
    Ok(())
}

fn field_error(index: usize, expected: &str) -> LedgerError {
    LedgerError::InvalidResponse(format!("tuple field {} is not {}", index, expected))
}

pub(crate) fn uint_value(value: &Value) -> Option<LedgerUint> {
    LedgerUint::try_from(value).ok()
}

fn uint_at(values: &[Value], index: usize) -> Result<LedgerUint, LedgerError> {
    values
        .get(index)
        .and_then(uint_value)
        .ok_or_else(|| field_error(index, "an unsigned integer"))
}

fn u64_at(values: &[Value], index: usize) -> Result<u64, LedgerError> {
    uint_at(values, index)?
        .to_u128()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| field_error(index, "a 64-bit integer"))
}

fn amount_at(values: &[Value], index: usize) -> Result<Amount, LedgerError> {
    let units = uint_at(values, index)?;
    Amount::from_ledger_units(&units).map_err(|_| field_error(index, "a supported amount"))
}

fn timestamp_at(values: &[Value], index: usize) -> Result<DateTime<Utc>, LedgerError> {
    let seconds = u64_at(values, index)?;
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| field_error(index, "an epoch timestamp"))
}

fn string_at(values: &[Value], index: usize) -> Result<String, LedgerError> {
    values
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| field_error(index, "a string"))
}

fn bool_at(values: &[Value], index: usize) -> Result<bool, LedgerError> {
    match values.get(index) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s == "true" => Ok(true),
        Some(Value::String(s)) if s == "false" => Ok(false),
        _ => Err(field_error(index, "a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_policy_tuple() {
        let values = serde_json::json!([
            "0xholder",
            "50000000000000000000000",
            "0x6596a580",
            1735689600,
            "health",
            true
        ]);
        let policy = decode_policy(values.as_array().unwrap()).unwrap();
        assert_eq!(policy.coverage_amount, Amount::from_whole(50000));
        assert_eq!(policy.start_date.timestamp(), 1_704_371_584);
        assert_eq!(policy.end_date.timestamp(), 1_735_689_600);
        assert!(policy.is_active);
    }

    #[test]
    fn decodes_claim_tuple_and_keeps_large_ids() {
        let values = serde_json::json!([
            "98765432109876543210",
            "0xholder",
            "30000000000000000000000",
            "Fracture",
            1704844800,
            false,
            "false",
            "0",
            "AABHA-1",
            1704844800,
            "0",
            false,
            0,
            "0"
        ]);
        let claim = decode_claim(values.as_array().unwrap()).unwrap();
        assert_eq!(claim.policy_number.as_str(), "98765432109876543210");
        assert_eq!(claim.amount, Amount::from_whole(30000));
        assert!(!claim.is_paid);
        assert_eq!(claim.paid_amount, Amount::ZERO);
        assert_eq!(claim.aabha_id, "AABHA-1");
    }

    #[test]
    fn short_tuples_are_rejected() {
        let values = serde_json::json!(["0xholder", "1"]);
        let err = decode_policy(values.as_array().unwrap()).unwrap_err();
        assert!(format!("{err}").contains("getPolicy returned 2 fields"));
    }

    #[test]
    fn wrong_field_types_are_rejected() {
        let values = serde_json::json!(["0xholder", "1", 0, 0, "health", "yes"]);
        let err = decode_policy(values.as_array().unwrap()).unwrap_err();
        assert!(format!("{err}").contains("tuple field 5"));
    }
}

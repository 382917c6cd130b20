use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use swiftclaim_contracts::{Amount, ClaimType, LedgerUint, ParseAmountError};

use super::ClaimError;

/// `POST /claim` body as sent by callers. Every field is optional here so
/// that presence is judged by the orchestrator, not by the JSON decoder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSubmission {
    #[serde(default)]
    pub policy_number: Option<Value>,
    #[serde(default)]
    pub claim_amount: Option<Value>,
    #[serde(default)]
    pub incident_description: Option<String>,
    #[serde(default)]
    pub bill_start_date: Option<String>,
    #[serde(default)]
    pub bill_end_date: Option<String>,
    #[serde(default)]
    pub aabha_id: Option<Value>,
    #[serde(default)]
    pub flight_id: Option<Value>,
}

/// Submission after presence checks. The amount is parsed eagerly but only
/// judged after the policy is known.
#[derive(Debug)]
pub(super) struct CheckedSubmission {
    pub(super) policy_number: String,
    pub(super) claim_amount: Result<Amount, ParseAmountError>,
    pub(super) incident_description: String,
    pub(super) bill_start_date: Option<DateTime<Utc>>,
    pub(super) bill_end_date: Option<DateTime<Utc>>,
    pub(super) aabha_id: Option<String>,
    pub(super) flight_id: Option<String>,
}

impl CheckedSubmission {
    /// An AABHA id makes a health claim; anything else is travel.
    pub(super) fn claim_type(&self) -> ClaimType {
        if self.aabha_id.is_some() {
            ClaimType::Health
        } else {
            ClaimType::Travel
        }
    }
}

pub(super) fn check_presence(
    submission: &ClaimSubmission,
) -> Result<CheckedSubmission, ClaimError> {
    let policy_number = submission.policy_number.as_ref().and_then(identifier_text);
    let claim_amount = submission.claim_amount.as_ref().and_then(amount_text);
    let incident_description = submission
        .incident_description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (Some(policy_number), Some(claim_amount), Some(incident_description)) =
        (policy_number, claim_amount, incident_description)
    else {
        return Err(ClaimError::MissingFields);
    };

    let bill_start_date = parse_bill_date(submission.bill_start_date.as_deref(), "billStartDate")?;
    let bill_end_date = parse_bill_date(submission.bill_end_date.as_deref(), "billEndDate")?;

    Ok(CheckedSubmission {
        policy_number,
        claim_amount: Amount::parse(&claim_amount),
        incident_description: incident_description.to_string(),
        bill_start_date,
        bill_end_date,
        aabha_id: submission.aabha_id.as_ref().and_then(identifier_text),
        flight_id: submission.flight_id.as_ref().and_then(identifier_text),
    })
}

/// `0 < amount <= coverage`.
pub(super) fn check_amount(
    amount: &Result<Amount, ParseAmountError>,
    coverage: Amount,
) -> Result<Amount, ClaimError> {
    match amount {
        Ok(amount) if !amount.is_zero() && *amount <= coverage => Ok(*amount),
        Ok(_) => Err(ClaimError::InvalidClaimAmount {
            coverage: Some(coverage),
        }),
        Err(_) => Err(ClaimError::InvalidClaimAmount { coverage: None }),
    }
}

pub(super) fn ledger_identifier(
    field: &'static str,
    value: &str,
) -> Result<LedgerUint, ClaimError> {
    LedgerUint::from_identifier(value).map_err(|_| ClaimError::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

/// Strings are trimmed; integers keep their decimal form.
fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Zero is a present amount; only null and blank are absent.
fn amount_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

fn parse_bill_date(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ClaimError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| ClaimError::InvalidBillDate { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(body: Value) -> ClaimSubmission {
        serde_json::from_value(body).expect("body should decode")
    }

    #[test]
    fn absent_or_blank_required_fields_are_missing() {
        for body in [
            serde_json::json!({"claimAmount": 10, "incidentDescription": "Surgery"}),
            serde_json::json!({"policyNumber": "POL-1", "incidentDescription": "Surgery"}),
            serde_json::json!({
                "policyNumber": "POL-1",
                "claimAmount": null,
                "incidentDescription": "Surgery"
            }),
            serde_json::json!({
                "policyNumber": "  ",
                "claimAmount": 10,
                "incidentDescription": "Surgery"
            }),
            serde_json::json!({
                "policyNumber": "POL-1",
                "claimAmount": 10,
                "incidentDescription": " "
            }),
        ] {
            let err = check_presence(&submission(body)).unwrap_err();
            assert!(matches!(err, ClaimError::MissingFields));
        }
    }

    #[test]
    fn zero_amount_counts_as_present_but_fails_bounds() {
        let checked = check_presence(&submission(serde_json::json!({
            "policyNumber": 1,
            "claimAmount": 0,
            "incidentDescription": "Surgery"
        })))
        .expect("zero is present");

        assert_eq!(checked.policy_number, "1");
        let err = check_amount(&checked.claim_amount, Amount::from_whole(100)).unwrap_err();
        assert!(matches!(err, ClaimError::InvalidClaimAmount { coverage: Some(_) }));
    }

    #[test]
    fn amount_bounds_are_inclusive_of_coverage() {
        let coverage = Amount::from_whole(50000);
        assert_eq!(
            check_amount(&Ok(Amount::from_whole(50000)), coverage).unwrap(),
            coverage
        );
        assert!(check_amount(&Amount::parse("50000.000000000000000001"), coverage).is_err());
        let err = check_amount(&Amount::parse("-5"), coverage).unwrap_err();
        assert!(matches!(err, ClaimError::InvalidClaimAmount { coverage: None }));
        assert!(check_amount(&Amount::parse("lots"), coverage).is_err());
    }

    #[test]
    fn aabha_id_makes_health_claims_and_everything_else_is_travel() {
        let mut checked = check_presence(&submission(serde_json::json!({
            "policyNumber": "POL-1",
            "claimAmount": "10",
            "incidentDescription": "Delay",
            "flightId": "AI-202"
        })))
        .unwrap();
        assert_eq!(checked.claim_type(), ClaimType::Travel);

        checked.aabha_id = Some("AABHA-1".to_string());
        assert_eq!(checked.claim_type(), ClaimType::Health);

        checked.aabha_id = None;
        checked.flight_id = None;
        assert_eq!(checked.claim_type(), ClaimType::Travel);
    }

    #[test]
    fn bill_dates_accept_plain_dates_and_rfc3339() {
        let checked = check_presence(&submission(serde_json::json!({
            "policyNumber": "POL-1",
            "claimAmount": 10,
            "incidentDescription": "Surgery",
            "billStartDate": "2024-01-01",
            "billEndDate": "2024-01-05T10:30:00+05:30"
        })))
        .unwrap();

        assert_eq!(checked.bill_start_date.unwrap().timestamp(), 1_704_067_200);
        assert_eq!(
            checked.bill_end_date.unwrap().to_rfc3339(),
            "2024-01-05T05:00:00+00:00"
        );

        let err = check_presence(&submission(serde_json::json!({
            "policyNumber": "POL-1",
            "claimAmount": 10,
            "incidentDescription": "Surgery",
            "billStartDate": "01/02/2024"
        })))
        .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidBillDate { field: "billStartDate" }));
    }

    #[test]
    fn ledger_identifiers_reject_non_numeric_values() {
        assert_eq!(ledger_identifier("policyNumber", "POL-1").unwrap().as_str(), "1");
        assert_eq!(ledger_identifier("flightId", "202").unwrap().as_str(), "202");
        let err = ledger_identifier("flightId", "AIRINDIA").unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_IDENTIFIER");
    }
}

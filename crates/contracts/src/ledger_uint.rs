use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest value representable by the ledger's native `uint256`.
const UINT256_MAX: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Unsigned ledger integer kept as a canonical decimal string.
///
/// The relational side works with text identifiers and 64-bit ids while the
/// ledger speaks `uint256`; values cross that boundary through this type so
/// nothing is ever routed through a float or truncated to a machine word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerUint(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseUintError {
    pub reason: &'static str,
}

impl fmt::Display for ParseUintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ledger integer: {}", self.reason)
    }
}

impl std::error::Error for ParseUintError {}

impl LedgerUint {
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn parse_decimal(raw: &str) -> Result<Self, ParseUintError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseUintError { reason: "empty" });
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseUintError {
                reason: "expected decimal digits",
            });
        }

        let digits = raw.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        Self::bounded(digits.to_string())
    }

    /// Parses a `0x`-prefixed hex quantity as emitted by JSON-RPC nodes.
    pub fn from_hex(raw: &str) -> Result<Self, ParseUintError> {
        let hex = raw
            .trim()
            .strip_prefix("0x")
            .or_else(|| raw.trim().strip_prefix("0X"))
            .ok_or(ParseUintError {
                reason: "missing 0x prefix",
            })?;
        if hex.is_empty() {
            return Err(ParseUintError { reason: "empty" });
        }

        // little-endian base-10 digits
        let mut digits: Vec<u8> = vec![0];
        for ch in hex.chars() {
            let nibble = ch.to_digit(16).ok_or(ParseUintError {
                reason: "expected hex digits",
            })?;

            let mut carry = nibble;
            for digit in digits.iter_mut() {
                let value = u32::from(*digit) * 16 + carry;
                *digit = (value % 10) as u8;
                carry = value / 10;
            }
            while carry > 0 {
                digits.push((carry % 10) as u8);
                carry /= 10;
            }
        }

        while digits.len() > 1 && digits.last() == Some(&0) {
            digits.pop();
        }
        let decimal = digits
            .iter()
            .rev()
            .map(|d| char::from(b'0' + d))
            .collect::<String>();
        Self::bounded(decimal)
    }

    /// Maps an external identifier onto the ledger integer space.
    ///
    /// Accepts plain decimal identifiers (`"1042"`) and prefixed ones whose
    /// numeric part follows the last `-` (`"POL-1042"`, `"AI-0202"`).
    pub fn from_identifier(raw: &str) -> Result<Self, ParseUintError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseUintError { reason: "empty" });
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return Self::parse_decimal(raw);
        }

        let (prefix, numeric) = raw.rsplit_once('-').ok_or(ParseUintError {
            reason: "identifier has no numeric component",
        })?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(ParseUintError {
                reason: "identifier prefix must be alphanumeric",
            });
        }
        Self::parse_decimal(numeric)
    }

    fn bounded(digits: String) -> Result<Self, ParseUintError> {
        let too_large = match digits.len().cmp(&UINT256_MAX.len()) {
            Ordering::Greater => true,
            Ordering::Equal => digits.as_str() > UINT256_MAX,
            Ordering::Less => false,
        };
        if too_large {
            return Err(ParseUintError {
                reason: "exceeds uint256",
            });
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }

    pub fn to_u128(&self) -> Option<u128> {
        self.0.parse().ok()
    }
}

impl Ord for LedgerUint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for LedgerUint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for LedgerUint {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<u128> for LedgerUint {
    fn from(value: u128) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for LedgerUint {
    type Err = ParseUintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("0x") || s.starts_with("0X") {
            Self::from_hex(s)
        } else {
            Self::parse_decimal(s)
        }
    }
}

impl fmt::Display for LedgerUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for LedgerUint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LedgerUint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        LedgerUint::try_from(&value).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<&serde_json::Value> for LedgerUint {
    type Error = ParseUintError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => s.parse(),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(LedgerUint::from)
                .ok_or(ParseUintError {
                    reason: "number is not a non-negative integer",
                }),
            _ => Err(ParseUintError {
                reason: "expected string or number",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parse_strips_leading_zeros() {
        assert_eq!(LedgerUint::parse_decimal("000420").unwrap().as_str(), "420");
        assert_eq!(LedgerUint::parse_decimal("0000").unwrap().as_str(), "0");
        assert!(LedgerUint::parse_decimal("-1").is_err());
        assert!(LedgerUint::parse_decimal("1.5").is_err());
    }

    #[test]
    fn values_beyond_i64_survive_round_trip() {
        let raw = "98765432109876543210987654321";
        let value: LedgerUint = raw.parse().unwrap();
        assert_eq!(value.to_string(), raw);
        assert_eq!(value.to_u128(), Some(98765432109876543210987654321));

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!(raw));
        let back: LedgerUint = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn uint256_bounds_are_enforced() {
        assert!(LedgerUint::parse_decimal(UINT256_MAX).is_ok());
        let err = LedgerUint::parse_decimal(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936",
        )
        .unwrap_err();
        assert_eq!(err.reason, "exceeds uint256");
    }

    #[test]
    fn hex_quantities_convert_to_decimal() {
        assert_eq!(LedgerUint::from_hex("0x0").unwrap().as_str(), "0");
        assert_eq!(LedgerUint::from_hex("0x1b").unwrap().as_str(), "27");
        assert_eq!(
            LedgerUint::from_hex("0xde0b6b3a7640000").unwrap().as_str(),
            "1000000000000000000"
        );
        assert!(LedgerUint::from_hex("1b").is_err());
        assert!(LedgerUint::from_hex("0xzz").is_err());
    }

    #[test]
    fn identifiers_map_to_numeric_component() {
        assert_eq!(LedgerUint::from_identifier("1042").unwrap().as_str(), "1042");
        assert_eq!(LedgerUint::from_identifier("POL-1").unwrap().as_str(), "1");
        assert_eq!(
            LedgerUint::from_identifier("AI-0202").unwrap().as_str(),
            "202"
        );
        assert!(LedgerUint::from_identifier("POLICY").is_err());
        assert!(LedgerUint::from_identifier("-12").is_err());
        assert!(LedgerUint::from_identifier("POL-").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let small: LedgerUint = "99".parse().unwrap();
        let large: LedgerUint = "100".parse().unwrap();
        assert!(small < large);
    }
}

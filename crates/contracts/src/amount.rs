use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ledger_uint::LedgerUint;

/// Fractional digits carried by [`Amount`]; one display unit is
/// `10^AMOUNT_SCALE` ledger base units.
pub const AMOUNT_SCALE: usize = 18;

const BASE_UNITS_PER_UNIT: u128 = 1_000_000_000_000_000_000;

/// Digits of `u128::MAX`; no representable amount has more whole digits.
const MAX_WHOLE_DIGITS: i64 = 39;

/// Non-negative fixed-point monetary value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount {
    base_units: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmountError {
    pub reason: &'static str,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid amount: {}", self.reason)
    }
}

impl std::error::Error for ParseAmountError {}

impl Amount {
    pub const ZERO: Amount = Amount { base_units: 0 };

    pub fn from_base_units(base_units: u128) -> Self {
        Self { base_units }
    }

    pub fn from_whole(units: u64) -> Self {
        Self {
            base_units: u128::from(units) * BASE_UNITS_PER_UNIT,
        }
    }

    pub fn base_units(self) -> u128 {
        self.base_units
    }

    pub fn is_zero(self) -> bool {
        self.base_units == 0
    }

    pub fn to_ledger_units(self) -> LedgerUint {
        LedgerUint::from(self.base_units)
    }

    pub fn from_ledger_units(units: &LedgerUint) -> Result<Self, ParseAmountError> {
        units
            .to_u128()
            .map(Self::from_base_units)
            .ok_or(ParseAmountError {
                reason: "ledger value exceeds supported range",
            })
    }

    /// Parses decimal text such as `"30000"`, `"12.50"` or `"1.5e3"`.
    pub fn parse(raw: &str) -> Result<Self, ParseAmountError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseAmountError { reason: "empty" });
        }
        if raw.starts_with('-') {
            return Err(ParseAmountError { reason: "negative" });
        }
        let raw = raw.strip_prefix('+').unwrap_or(raw);

        let (mantissa, exponent) = match raw.find(['e', 'E']) {
            Some(idx) => {
                let exponent = raw[idx + 1..].parse::<i32>().map_err(|_| ParseAmountError {
                    reason: "malformed exponent",
                })?;
                (&raw[..idx], exponent)
            }
            None => (raw, 0),
        };

        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseAmountError { reason: "no digits" });
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(ParseAmountError {
                reason: "expected decimal digits",
            });
        }

        let digits = format!("{int_part}{frac_part}");
        let significant = digits.trim_start_matches('0');
        if significant.is_empty() {
            return Ok(Self::ZERO);
        }
        let point = int_part.len() as i64 + i64::from(exponent);
        // Position of the first significant digit relative to the point.
        let first = point - (digits.len() - significant.len()) as i64;
        if first > MAX_WHOLE_DIGITS {
            return Err(ParseAmountError {
                reason: "out of range",
            });
        }
        if first < -(AMOUNT_SCALE as i64) {
            return Err(ParseAmountError {
                reason: "more than 18 fractional digits",
            });
        }
        let (whole, fraction) = if point <= 0 {
            (String::new(), format!("{}{}", "0".repeat((-point) as usize), digits))
        } else if point as usize >= digits.len() {
            (
                format!("{}{}", digits, "0".repeat(point as usize - digits.len())),
                String::new(),
            )
        } else {
            let (w, f) = digits.split_at(point as usize);
            (w.to_string(), f.to_string())
        };

        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > AMOUNT_SCALE {
            return Err(ParseAmountError {
                reason: "more than 18 fractional digits",
            });
        }

        let whole = whole.trim_start_matches('0');
        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| ParseAmountError {
                reason: "out of range",
            })?
        };
        let fraction_units = if fraction.is_empty() {
            0
        } else {
            format!("{:0<width$}", fraction, width = AMOUNT_SCALE)
                .parse::<u128>()
                .map_err(|_| ParseAmountError {
                    reason: "out of range",
                })?
        };

        whole_units
            .checked_mul(BASE_UNITS_PER_UNIT)
            .and_then(|units| units.checked_add(fraction_units))
            .map(Self::from_base_units)
            .ok_or(ParseAmountError {
                reason: "out of range",
            })
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&serde_json::Value> for Amount {
    type Error = ParseAmountError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => Self::parse(&n.to_string()),
            serde_json::Value::String(s) => Self::parse(s),
            _ => Err(ParseAmountError {
                reason: "expected number or numeric string",
            }),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.base_units / BASE_UNITS_PER_UNIT;
        let fraction = self.base_units % BASE_UNITS_PER_UNIT;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let fraction = format!("{:0>width$}", fraction, width = AMOUNT_SCALE);
        write!(f, "{}.{}", whole, fraction.trim_end_matches('0'))
    }
}

/// A JSON number when it carries the exact value, the decimal string
/// otherwise.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let whole = self.base_units / BASE_UNITS_PER_UNIT;
        if self.base_units % BASE_UNITS_PER_UNIT == 0
            && let Ok(whole) = u64::try_from(whole)
        {
            return serializer.serialize_u64(whole);
        }
        let text = self.to_string();
        match text.parse::<f64>() {
            Ok(float) if float.to_string() == text => serializer.serialize_f64(float),
            _ => serializer.serialize_str(&text),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Amount::try_from(&value).map_err(serde::de::Error::custom)
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Statement placeholders that stand for "no value".
pub const NULL_SENTINELS: &[&str] = &["unavailable", "not applicable", "n/a", "-", "", "null", "none"];

/// Exclusive upper bound for values stored in `NUMERIC(15,2)` columns.
const NUMERIC_15_2_LIMIT: i64 = 10_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Cannot parse currency value: '{0}'")]
    InvalidCurrency(String),
    #[error("Cannot parse date value: '{0}'. Expected YYYY-MM-DD, MM/DD/YYYY or MM/DD/YY")]
    InvalidDate(String),
}

pub fn is_null_sentinel(s: &str) -> bool {
    let s = s.trim();
    NULL_SENTINELS.iter().any(|n| n.eq_ignore_ascii_case(s))
}

/// A raw statement value. Extractors emit amounts either as JSON strings
/// (`"$1,234.56"`) or as bare numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s.as_str()),
            Scalar::Number(n) => Cow::Owned(n.to_string()),
            Scalar::Bool(b) => Cow::Owned(b.to_string()),
        }
    }

    /// Parse as a currency amount. Numbers are taken through their decimal text.
    pub fn to_decimal(&self) -> Result<Option<Decimal>, ParseError> {
        match self {
            Scalar::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map(Some)
                .map_err(|_| ParseError::InvalidCurrency(n.to_string())),
            other => parse_currency(&other.as_text()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

/// Parse a statement currency string.
///
/// `$` and `,` are dropped, accounting parentheses mean negative, and the
/// null sentinels (`unavailable`, `n/a`, `-`, ...) yield `Ok(None)`.
pub fn parse_currency(s: &str) -> Result<Option<Decimal>, ParseError> {
    let trimmed = s.trim();
    if is_null_sentinel(trimmed) {
        return Ok(None);
    }

    let mut cleaned = trimmed.replace(['$', ',', ' '], "");
    if cleaned.contains('(') || cleaned.contains(')') {
        cleaned = format!("-{}", cleaned.replace(['(', ')', '-'], ""));
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
        .map_err(|_| ParseError::InvalidCurrency(trimmed.to_string()))
}

/// Parse an optional raw value; absent values are `Ok(None)`.
pub fn parse_amount(value: Option<&Scalar>) -> Result<Option<Decimal>, ParseError> {
    match value {
        Some(v) => v.to_decimal(),
        None => Ok(None),
    }
}

pub fn fits_numeric_15_2(value: Decimal) -> bool {
    value.abs() < Decimal::from(NUMERIC_15_2_LIMIT)
}

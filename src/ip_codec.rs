//! IPv4 address normalisation into canonical integers.
//!
//! Source tables carry addresses as dotted quads, integers, floats (often in
//! scientific notation) or nothing at all. Everything is funnelled through
//! [`encode`], which yields a non-negative integer or [`IP_SENTINEL`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Out-of-band value for a missing or unrepresentable address.
pub const IP_SENTINEL: i64 = -1;

// Floats below 2^53 convert to i64 exactly.
const I64_EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;
const MISSING_MARKERS: [&str; 5] = ["", "nan", "na", "null", "none"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IpRepr {
    Dotted(String),
    NumericString(String),
    Integer(i64),
    Float(f64),
    Missing,
}

/// Hashable identity of an [`IpRepr`], used for exact-row comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IpKey {
    Dotted(String),
    NumericString(String),
    Integer(i64),
    Float(u64),
    Missing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpCodecError {
    #[error("malformed IPv4 address '{value}': expected 4 octets, found {octets}")]
    MalformedAddress { value: String, octets: usize },
}

impl IpRepr {
    /// Classifies a raw text field the way a type-inferring CSV reader would:
    /// numbers first, then dotted text, then anything else.
    ///
    /// Two-part dotted text such as `"1.2"` is therefore read as a float, not
    /// rejected with [`IpCodecError::MalformedAddress`].
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_MARKERS
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
        {
            return Self::Missing;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Integer(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_nan() {
                return Self::Missing;
            }
            return Self::Float(value);
        }
        Self::from_text(trimmed)
    }

    /// Wraps text without numeric inference.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.contains('.') {
            Self::Dotted(text)
        } else {
            Self::NumericString(text)
        }
    }

    /// Integral floats share the key of the equal integer.
    pub fn key(&self) -> IpKey {
        match self {
            Self::Dotted(text) => IpKey::Dotted(text.clone()),
            Self::NumericString(text) => IpKey::NumericString(text.clone()),
            Self::Integer(value) => IpKey::Integer(*value),
            Self::Float(value) if value.fract() == 0.0 && value.abs() < I64_EXACT_LIMIT => {
                IpKey::Integer(*value as i64)
            }
            Self::Float(value) => IpKey::Float(value.to_bits()),
            Self::Missing => IpKey::Missing,
        }
    }
}

impl From<i64> for IpRepr {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for IpRepr {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self::Missing
        } else {
            Self::Float(value)
        }
    }
}

impl From<&str> for IpRepr {
    fn from(value: &str) -> Self {
        Self::from_text(value)
    }
}

impl<T: Into<IpRepr>> From<Option<T>> for IpRepr {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Missing)
    }
}

/// Converts an address into its integer form.
///
/// Only dotted text with the wrong number of parts is an error; every other
/// unparsable input degrades to [`IP_SENTINEL`].
pub fn encode(ip: &IpRepr) -> Result<i64, IpCodecError> {
    match ip {
        IpRepr::Missing => Ok(IP_SENTINEL),
        IpRepr::Integer(value) => Ok(*value),
        IpRepr::Float(value) => Ok(truncate_float(*value)),
        IpRepr::Dotted(text) => encode_dotted(text),
        IpRepr::NumericString(text) => Ok(text
            .trim()
            .parse::<f64>()
            .map(truncate_float)
            .unwrap_or(IP_SENTINEL)),
    }
}

/// Renders an integer address as a canonical dotted quad.
pub fn render_dotted(ip: u32) -> String {
    let [a, b, c, d] = ip.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

fn encode_dotted(text: &str) -> Result<i64, IpCodecError> {
    let parts: Vec<&str> = text.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(IpCodecError::MalformedAddress {
            value: text.to_string(),
            octets: parts.len(),
        });
    }

    let mut value: i64 = 0;
    for part in parts {
        match part.parse::<u8>() {
            Ok(octet) => value = (value << 8) | i64::from(octet),
            Err(_) => return Ok(IP_SENTINEL),
        }
    }
    Ok(value)
}

fn truncate_float(value: f64) -> i64 {
    // i64::MAX is not exactly representable; the bound below is 2^63.
    if !value.is_finite() || value >= 9_223_372_036_854_775_808.0 || value < i64::MIN as f64 {
        return IP_SENTINEL;
    }
    value.trunc() as i64
}

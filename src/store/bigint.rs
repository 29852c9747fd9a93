//! Text encoding for integers wider than a JSON number can carry.
//!
//! A large integer is written as its decimal digits followed by an `n`
//! marker (`"5000000000000000000000n"`), so it survives a text-only store and
//! is never confused with a float or a plain string on the way back.

use alloy::primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};
use std::str::FromStr;

pub const MARKER: char = 'n';

pub fn encode(value: &U256) -> String {
    format!("{value}{MARKER}")
}

/// Parse a marked decimal string. Unmarked or non-decimal input is rejected.
pub fn decode(text: &str) -> Option<U256> {
    let digits = text.strip_suffix(MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str(digits).ok()
}

/// `#[serde(with = "crate::store::bigint")]` for `U256` fields.
pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode(value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let text = String::deserialize(deserializer)?;
    decode(&text).ok_or_else(|| de::Error::custom(format!("not a marked big integer: {text:?}")))
}

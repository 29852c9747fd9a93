//! Schema-driven log decoding.
//!
//! Indexed arguments come from topics[1..], the rest from the data section in
//! declaration order, one 32-byte head word each. A `string` head word is an
//! offset to a length-prefixed tail.

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use super::abi::{ArgKind, EventRegistry, Source};
use super::format::{format_amount, short_address};
use crate::chain::RawLog;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topic0")]
    NoTopic,
    #[error("log from unwatched contract {0}")]
    UnknownSource(Address),
    #[error("{origin} emitted unknown event topic {topic}")]
    UnknownEvent { origin: Source, topic: B256 },
    #[error("{event}: missing {what}")]
    Truncated { event: &'static str, what: String },
    #[error("{event}: bad dynamic offset for {arg}")]
    BadOffset { event: &'static str, arg: &'static str },
    #[error("{event}: {arg} is not valid UTF-8")]
    InvalidUtf8 { event: &'static str, arg: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Address(Address),
    Amount(U256, &'static str),
    Uint(U256),
    Bool(bool),
    Text(String),
}

impl ArgValue {
    /// Display form: truncated address, rounded amount with symbol, literal
    /// otherwise.
    pub fn format(&self) -> String {
        match self {
            ArgValue::Address(a) => short_address(a),
            ArgValue::Amount(v, symbol) => format_amount(*v, symbol),
            ArgValue::Uint(v) => v.to_string(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub source: Source,
    pub name: &'static str,
    pub args: Vec<(&'static str, ArgValue)>,
}

fn word_at(data: &[u8], offset: usize) -> Option<&[u8]> {
    data.get(offset..offset.checked_add(32)?)
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    usize::try_from(U256::from_be_slice(word)).ok()
}

fn static_value(kind: ArgKind, word: &[u8]) -> ArgValue {
    match kind {
        ArgKind::Address => ArgValue::Address(Address::from_slice(&word[12..])),
        ArgKind::Amount(symbol) => ArgValue::Amount(U256::from_be_slice(word), symbol),
        ArgKind::Bool => ArgValue::Bool(!U256::from_be_slice(word).is_zero()),
        // Text is never static; callers route it to the tail decoder
        ArgKind::Uint | ArgKind::Text => ArgValue::Uint(U256::from_be_slice(word)),
    }
}

fn decode_text(
    data: &[u8],
    head: &[u8],
    event: &'static str,
    arg: &'static str,
) -> Result<String, DecodeError> {
    let bad_offset = || DecodeError::BadOffset { event, arg };
    let offset = word_to_usize(head).ok_or_else(bad_offset)?;
    let len = word_at(data, offset)
        .and_then(word_to_usize)
        .ok_or_else(bad_offset)?;
    let start = offset + 32;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(bad_offset)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { event, arg })
}

/// Decode a raw log against the schema registered for its contract and topic0.
pub fn decode_log(registry: &EventRegistry, log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::NoTopic)?;
    let source = registry
        .source_of(&log.address)
        .ok_or(DecodeError::UnknownSource(log.address))?;
    let schema = registry
        .lookup(source, topic0)
        .ok_or(DecodeError::UnknownEvent {
            origin: source,
            topic: *topic0,
        })?;

    let data: &[u8] = &log.data;
    let mut topic_idx = 1;
    let mut head = 0usize;
    let mut args = Vec::with_capacity(schema.inputs.len());

    for input in schema.inputs {
        let value = if input.indexed {
            let topic = log.topics.get(topic_idx).ok_or_else(|| DecodeError::Truncated {
                event: schema.name,
                what: format!("topic {topic_idx} ({})", input.name),
            })?;
            topic_idx += 1;
            static_value(input.kind, topic.as_slice())
        } else {
            let word = word_at(data, head).ok_or_else(|| DecodeError::Truncated {
                event: schema.name,
                what: format!("data word at {head} ({})", input.name),
            })?;
            head += 32;
            match input.kind {
                ArgKind::Text => ArgValue::Text(decode_text(data, word, schema.name, input.name)?),
                kind => static_value(kind, word),
            }
        };
        args.push((input.name, value));
    }

    Ok(DecodedEvent {
        source,
        name: schema.name,
        args,
    })
}

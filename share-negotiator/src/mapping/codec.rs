//! Flat string encoding of a name mapping.
//!
//! Pairs are written as `key:value:key:value`. Literal `:` and `\` inside a
//! name are prefixed with `\`, so any mapping survives a round trip.

use crate::utils::errors::{NegotiationError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const DELIMITER: char = ':';
pub const ESCAPE: char = '\\';

/// Matches one token followed by an unescaped delimiter.
fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"(?s)((?:\\.|[^\\:])*):").expect("token pattern is valid"))
}

pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == DELIMITER || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

pub fn unescape(token: &str) -> Result<String> {
    let mut raw = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(next) => raw.push(next),
                None => {
                    return Err(NegotiationError::MalformedMapping(format!(
                        "dangling escape in '{}'",
                        token
                    )))
                }
            }
        } else {
            raw.push(c);
        }
    }
    Ok(raw)
}

pub fn serialize(mapping: &BTreeMap<String, String>) -> String {
    let delimiter = DELIMITER.to_string();
    mapping
        .iter()
        .flat_map(|(key, value)| [escape(key), escape(value)])
        .collect::<Vec<_>>()
        .join(&delimiter)
}

pub fn deserialize(encoded: &str) -> Result<BTreeMap<String, String>> {
    let mut mapping = BTreeMap::new();
    if encoded.is_empty() {
        return Ok(mapping);
    }

    // Terminate the last token so every token is followed by a delimiter.
    let terminated = format!("{}{}", encoded, DELIMITER);
    let mut tokens = Vec::new();
    let mut consumed = 0;

    for captures in token_regex().captures_iter(&terminated) {
        let (Some(whole), Some(token)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() != consumed {
            return Err(NegotiationError::MalformedMapping(format!(
                "unexpected character at offset {}",
                consumed
            )));
        }
        consumed = whole.end();
        tokens.push(unescape(token.as_str())?);
    }

    if consumed != terminated.len() {
        return Err(NegotiationError::MalformedMapping(format!(
            "trailing data after offset {}",
            consumed
        )));
    }

    if tokens.len() % 2 != 0 {
        return Err(NegotiationError::MalformedMapping(format!(
            "odd number of tokens ({})",
            tokens.len()
        )));
    }

    let mut tokens = tokens.into_iter();
    while let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
        mapping.insert(key, value);
    }

    Ok(mapping)
}

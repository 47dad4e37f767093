//! Distinguished Name strings as forwarded by a TLS-terminating proxy.
//!
//! Proxies such as nginx render the client subject/issuer in RFC 2253 form
//! (`CN=Jane Doe,O=Example,C=CZ`) and escape every non-ASCII UTF-8 byte on
//! its own, so `Š` arrives as `\C5\A0`. [`parse_dn`] splits such a string
//! into attribute/value pairs and turns the escaped bytes back into text.
//!
//! Parsing never fails. Segments that are not `key=value` are skipped, and a
//! value whose escaped bytes do not form valid UTF-8 is returned in its
//! partially decoded form.

use crate::fields::NameMap;

/// RFC 2253 characters that may appear backslash-escaped in a value.
const SPECIAL_CHARS: &[u8] = b",+\"\\<>;=#";

/// Parse a DN string into a key/value map.
///
/// Pairs are separated by unescaped commas. Keys must be bare attribute
/// names (ASCII letters). When a key repeats, the last occurrence wins.
pub fn parse_dn(dn: &str) -> NameMap {
    let mut parts = NameMap::new();

    for segment in split_unescaped(dn, b',') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphabetic()) {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        parts.insert(key.to_string(), decode_escapes(value));
    }

    parts
}

/// Split `input` at every `separator` byte that is not preceded by a
/// backslash escape.
fn split_unescaped(input: &str, separator: u8) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes.get(i) {
            Some(b'\\') => i += 2,
            Some(&b) if b == separator => {
                if let Some(segment) = input.get(start..i) {
                    segments.push(segment);
                }
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    if let Some(tail) = input.get(start..) {
        if !tail.is_empty() {
            segments.push(tail);
        }
    }

    segments
}

/// Decode the escape sequences of one DN value.
///
/// Two passes, in this order: `\xHH` pairs first, then bare `\HH` pairs
/// (plus RFC 2253 `\,`-style escapes). The decoded bytes are read as UTF-8.
/// If they are not valid UTF-8 the result of the first pass is returned.
pub fn decode_escapes(value: &str) -> String {
    let first = decode_prefixed_hex(value.as_bytes());
    let second = decode_bare_hex(&first);

    match String::from_utf8(second) {
        Ok(text) => text,
        Err(_) => {
            tracing::debug!(value, "DN value is not valid UTF-8 after unescaping");
            String::from_utf8_lossy(&first).into_owned()
        }
    }
}

fn hex_pair(bytes: &[u8], at: usize) -> Option<u8> {
    let pair = bytes.get(at..at + 2)?;
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// First pass: `\xHH` → byte `HH`.
fn decode_prefixed_hex(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while let Some(&b) = input.get(i) {
        if b == b'\\' && input.get(i + 1) == Some(&b'x') {
            if let Some(byte) = hex_pair(input, i + 2) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }

    out
}

/// Second pass: `\HH` → byte `HH`, `\,` and friends → the literal character.
fn decode_bare_hex(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while let Some(&b) = input.get(i) {
        if b == b'\\' {
            if let Some(byte) = hex_pair(input, i + 1) {
                out.push(byte);
                i += 3;
                continue;
            }
            if let Some(&next) = input.get(i + 1) {
                if SPECIAL_CHARS.contains(&next) {
                    out.push(next);
                    i += 2;
                    continue;
                }
            }
        }
        out.push(b);
        i += 1;
    }

    out
}

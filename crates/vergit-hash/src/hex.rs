//! Lowercase hex codec for object ids and id prefixes.

use crate::HashError;

/// Value of one hex digit, either case.
fn digit_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// The lowercase digit for a nibble in 0..16.
fn digit_of(nibble: u8) -> char {
    char::from_digit(u32::from(nibble), 16).expect("nibble in range")
}

/// Encode bytes as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(digit_of(b >> 4));
        out.push(digit_of(b & 0x0f));
    }
    out
}

/// Decode a hex string into `out`. Accepts either case; the string must be
/// exactly twice the output length.
pub fn decode(hex: &str, out: &mut [u8]) -> Result<(), HashError> {
    if hex.len() != out.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: out.len() * 2,
            actual: hex.len(),
        });
    }

    let pairs = hex.as_bytes().chunks_exact(2);
    for (i, (pair, slot)) in pairs.zip(out.iter_mut()).enumerate() {
        let invalid = |at: usize| HashError::InvalidHex {
            position: at,
            character: hex.as_bytes()[at] as char,
        };
        let hi = digit_value(pair[0]).ok_or_else(|| invalid(i * 2))?;
        let lo = digit_value(pair[1]).ok_or_else(|| invalid(i * 2 + 1))?;
        *slot = (hi << 4) | lo;
    }
    Ok(())
}

/// Is `s` made of hex digits only, with an even length?
pub fn is_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| digit_value(b).is_some())
}

/// Convert a 1–40 char hex prefix to raw bytes for prefix lookup.
///
/// Odd-length prefixes get a zero low nibble appended to the final byte;
/// the second element of the result is true in that case, telling the
/// index lookup to mask the last half byte before comparing.
///
/// Returns `None` if the prefix contains a non-hex character.
pub fn hex_prefix_to_bytes(prefix: &str) -> Option<(Vec<u8>, bool)> {
    let digits = prefix.as_bytes();

    let mut bytes = Vec::with_capacity(digits.len().div_ceil(2));
    for chunk in digits.chunks(2) {
        let hi = digit_value(chunk[0])?;
        let lo = match chunk.get(1) {
            Some(&c) => digit_value(c)?,
            None => 0,
        };
        bytes.push((hi << 4) | lo);
    }
    Some((bytes, digits.len() % 2 != 0))
}

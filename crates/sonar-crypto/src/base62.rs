//! Base62 catalog identifiers.
//!
//! Catalog URIs such as `spotify:track:4gtj0ZuMWRw8WioT9SXsC2` carry a
//! 22-character base62 id (`0-9a-zA-Z` digit order) that decodes to the
//! 16-byte big-endian media id used on the wire.

use crate::{CryptoError, MEDIA_ID_SIZE};

/// Length of an encoded catalog id.
pub const ENCODED_LEN: usize = 22;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn digit(c: u8) -> Option<u128> {
    let value = match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'z' => c - b'a' + 10,
        b'A'..=b'Z' => c - b'A' + 36,
        _ => return None,
    };
    Some(u128::from(value))
}

/// Decode a base62 id into a 16-byte big-endian media id.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidBase62`] for empty input, characters
/// outside the alphabet, or values that do not fit in 128 bits.
pub fn decode(id: &str) -> Result<[u8; MEDIA_ID_SIZE], CryptoError> {
    if id.is_empty() {
        return Err(CryptoError::InvalidBase62("empty id".into()));
    }

    let mut n: u128 = 0;
    for c in id.bytes() {
        let d = digit(c)
            .ok_or_else(|| CryptoError::InvalidBase62(format!("unexpected character {:?}", c as char)))?;
        n = n
            .checked_mul(62)
            .and_then(|n| n.checked_add(d))
            .ok_or_else(|| CryptoError::InvalidBase62(format!("{id} exceeds 128 bits")))?;
    }

    Ok(n.to_be_bytes())
}

/// Encode a media id back into its 22-character base62 form.
#[must_use]
pub fn encode(media_id: &[u8; MEDIA_ID_SIZE]) -> String {
    let mut n = u128::from_be_bytes(*media_id);
    let mut out = [b'0'; ENCODED_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(n % 62) as usize];
        n /= 62;
    }
    out.iter().map(|&b| b as char).collect()
}

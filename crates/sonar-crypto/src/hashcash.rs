//! Hashcash proof-of-work.
//!
//! The access point may attach a hashcash challenge to its handshake
//! response: find a 16-byte suffix such that `SHA-1(prefix || suffix)` ends
//! in at least `length` zero bits. The search is seeded from a context
//! (the handshake transcript) so every login explores a different range.

use crate::CryptoError;
use sha1::{Digest, Sha1};

/// Size of a hashcash solution.
pub const SUFFIX_SIZE: usize = 16;

/// Default iteration budget before giving up.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1 << 24;

/// Count trailing zero bits of a SHA-1 digest (last 8 bytes, big-endian).
#[must_use]
pub fn trailing_zero_bits(digest: &[u8; 20]) -> u32 {
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[12..]);
    u64::from_be_bytes(tail).trailing_zeros()
}

fn digest(prefix: &[u8], suffix: &[u8; SUFFIX_SIZE]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(prefix);
    hasher.update(suffix);
    hasher.finalize().into()
}

/// Check a candidate solution.
#[must_use]
pub fn verify(prefix: &[u8], suffix: &[u8; SUFFIX_SIZE], length: u32) -> bool {
    trailing_zero_bits(&digest(prefix, suffix)) >= length
}

/// Search for a suffix that satisfies the challenge.
///
/// # Errors
///
/// Returns [`CryptoError::HashcashExhausted`] if no solution is found within
/// `max_iterations` attempts.
pub fn solve(
    context: &[u8],
    prefix: &[u8],
    length: u32,
    max_iterations: u64,
) -> Result<[u8; SUFFIX_SIZE], CryptoError> {
    let seed: [u8; 20] = Sha1::digest(context).into();
    let mut head = [0u8; 8];
    head.copy_from_slice(&seed[12..]);
    let mut first = u64::from_be_bytes(head);
    let mut second = 0u64;

    let mut suffix = [0u8; SUFFIX_SIZE];
    for _ in 0..max_iterations {
        suffix[..8].copy_from_slice(&first.to_be_bytes());
        suffix[8..].copy_from_slice(&second.to_be_bytes());

        if verify(prefix, &suffix, length) {
            return Ok(suffix);
        }

        second = second.wrapping_add(1);
        first = first.wrapping_add(1);
    }

    Err(CryptoError::HashcashExhausted(max_iterations))
}

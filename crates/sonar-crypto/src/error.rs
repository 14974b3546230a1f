//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Packet MAC did not match (corruption or wrong key)
    #[error("decryption failed: MAC mismatch")]
    MacMismatch,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Peer public value is outside the group
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Payload does not fit in a packet
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Invalid base62 input
    #[error("invalid base62 input: {0}")]
    InvalidBase62(String),

    /// Hashcash iteration budget exhausted
    #[error("hashcash unsolved after {0} iterations")]
    HashcashExhausted(u64),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}

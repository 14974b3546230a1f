//! # SONAR Crypto
//!
//! Cryptographic primitives for the SONAR access-point protocol.
//!
//! This crate provides:
//! - Diffie-Hellman key exchange over the protocol's fixed 768-bit group
//! - Handshake key derivation (HMAC-SHA1 over the handshake transcript)
//! - The Shannon stream cipher with its built-in MAC, wrapped as a
//!   per-direction packet cipher
//! - Per-file AES-128-CTR decryption with counter seeking
//! - Base62 decoding of catalog identifiers
//! - Hashcash proof-of-work solving
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key Exchange | DH, MODP group 1 | 96-byte public values |
//! | KDF | HMAC-SHA1 | 0x64 bytes of key material |
//! | Transport | Shannon | 32-byte key, 4-byte MAC |
//! | File cipher | AES-128-CTR | fixed IV, big-endian counter |
//! | Proof of work | SHA-1 hashcash | trailing zero bits |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aes_ctr;
pub mod base62;
pub mod dh;
pub mod error;
pub mod hashcash;
pub mod kdf;
pub mod random;
pub mod shannon;

pub use error::CryptoError;

/// DH public value / shared secret size
pub const DH_KEY_SIZE: usize = 96;

/// DH private exponent size
pub const DH_PRIVATE_KEY_SIZE: usize = 95;

/// Shannon transport key size
pub const SHANNON_KEY_SIZE: usize = 32;

/// Shannon MAC size appended to each packet
pub const MAC_SIZE: usize = 4;

/// AES file key size
pub const FILE_KEY_SIZE: usize = 16;

/// Catalog media id size (decoded base62)
pub const MEDIA_ID_SIZE: usize = 16;

/// Transport keys derived from the handshake
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for packets we send
    pub send_key: [u8; 32],
    /// Key for packets we receive
    pub recv_key: [u8; 32],
    /// Answer to the server's login challenge
    pub challenge: [u8; 20],
}

//! Diffie-Hellman key exchange over the protocol's fixed group.
//!
//! The access point only speaks the 768-bit MODP group from RFC 2409
//! (Oakley group 1) with generator 2. Public values and the shared secret
//! travel as 96-byte big-endian integers, left-padded with zeros.
//!
//! Provides:
//! - Peer public value range checks (rejects 0, 1, p-1 and anything >= p)
//! - Zeroization of the private exponent

use crate::{CryptoError, DH_KEY_SIZE, DH_PRIVATE_KEY_SIZE};
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Group prime (RFC 2409 section 6.1, 768-bit MODP).
const DH_PRIME: [u8; DH_KEY_SIZE] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2, 0x34,
    0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74,
    0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d, 0xf2, 0x5f, 0x14, 0x37,
    0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6,
    0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x3a, 0x36, 0x20, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// Group generator.
const DH_GENERATOR: u32 = 2;

fn prime() -> BigUint {
    BigUint::from_bytes_be(&DH_PRIME)
}

/// Left-pad a big-endian integer to the group width.
fn to_padded_bytes(value: &BigUint) -> [u8; DH_KEY_SIZE] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; DH_KEY_SIZE];
    out[DH_KEY_SIZE - raw.len()..].copy_from_slice(&raw);
    out
}

/// DH private exponent (95 random bytes).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; DH_PRIVATE_KEY_SIZE]);

/// DH public value (96 bytes, big-endian).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; DH_KEY_SIZE]);

/// DH shared secret (96 bytes, big-endian).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; DH_KEY_SIZE]);

impl PrivateKey {
    /// Generate a new random private exponent.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; DH_PRIVATE_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Import from raw exponent bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; DH_PRIVATE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn exponent(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Derive the public value `g^x mod p`.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let public = BigUint::from(DH_GENERATOR).modpow(&self.exponent(), &prime());
        PublicKey(to_padded_bytes(&public))
    }

    /// Perform the exchange against the peer's public value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the peer value is not in
    /// the range `2..p-1`, which would force a degenerate secret.
    pub fn exchange(&self, peer_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let p = prime();
        let peer = BigUint::from_bytes_be(&peer_public.0);
        let one = BigUint::from(1u32);

        if peer <= one || peer >= &p - &one {
            return Err(CryptoError::InvalidPublicKey);
        }

        let shared = peer.modpow(&self.exponent(), &p);
        Ok(SharedSecret(to_padded_bytes(&shared)))
    }
}

impl PublicKey {
    /// Export as bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; DH_KEY_SIZE] {
        self.0
    }

    /// Import from a wire value of any length up to 96 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the value is longer than
    /// the group width.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() > DH_KEY_SIZE || bytes.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: DH_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; DH_KEY_SIZE];
        out[DH_KEY_SIZE - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Get bytes as a slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DH_KEY_SIZE] {
        &self.0
    }
}

impl SharedSecret {
    /// Get shared secret as bytes.
    ///
    /// # Security
    ///
    /// Only feed this into [`crate::kdf::derive_session_keys`].
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DH_KEY_SIZE] {
        &self.0
    }
}

//! Handshake key derivation.
//!
//! The access point derives transport keys from the DH shared secret and the
//! complete handshake transcript (ClientHello packet followed by the
//! APResponse packet, both including their length prefixes):
//!
//! ```text
//! data      = HMAC-SHA1(secret, transcript || 0x01) || ... || HMAC-SHA1(secret, transcript || 0x05)
//! challenge = HMAC-SHA1(data[0x00..0x14], transcript)
//! send_key  = data[0x14..0x34]
//! recv_key  = data[0x34..0x54]
//! ```
//!
//! The iteration count and split offsets are fixed by the server.

use crate::SessionKeys;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroize;

type HmacSha1 = Hmac<Sha1>;

/// Size of the derived key material buffer.
pub const KEY_MATERIAL_SIZE: usize = 0x64;

const SHA1_SIZE: usize = 20;

fn hmac_sha1(key: &[u8], parts: &[&[u8]]) -> [u8; SHA1_SIZE] {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Derive transport keys and the challenge answer.
#[must_use]
pub fn derive_session_keys(shared_secret: &[u8], transcript: &[u8]) -> SessionKeys {
    let mut data = [0u8; KEY_MATERIAL_SIZE];
    for (i, block) in data.chunks_mut(SHA1_SIZE).enumerate() {
        let counter = [i as u8 + 1];
        let digest = hmac_sha1(shared_secret, &[transcript, &counter]);
        block.copy_from_slice(&digest[..block.len()]);
    }

    let challenge = hmac_sha1(&data[..0x14], &[transcript]);

    let mut keys = SessionKeys {
        send_key: [0u8; 32],
        recv_key: [0u8; 32],
        challenge,
    };
    keys.send_key.copy_from_slice(&data[0x14..0x34]);
    keys.recv_key.copy_from_slice(&data[0x34..0x54]);
    data.zeroize();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_material_blocks() {
        // 0x64 bytes is exactly five SHA-1 blocks
        assert_eq!(KEY_MATERIAL_SIZE, 5 * SHA1_SIZE);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let secret = [7u8; 96];
        let transcript = b"hello-packet||response-packet";

        let a = derive_session_keys(&secret, transcript);
        let b = derive_session_keys(&secret, transcript);

        assert_eq!(a.send_key, b.send_key);
        assert_eq!(a.recv_key, b.recv_key);
        assert_eq!(a.challenge, b.challenge);
        assert_ne!(a.send_key, a.recv_key);
    }

    #[test]
    fn test_split_offsets_match_blocks() {
        let secret = [1u8; 96];
        let transcript = [0xAAu8; 64];

        let keys = derive_session_keys(&secret, &transcript);

        // send key starts at block 2 (iteration byte 0x02)
        let block2 = hmac_sha1(&secret, &[&transcript, &[2]]);
        assert_eq!(keys.send_key[..20], block2);

        // recv key starts 12 bytes into block 3
        let block3 = hmac_sha1(&secret, &[&transcript, &[3]]);
        assert_eq!(keys.recv_key[..8], block3[12..]);
        let block4 = hmac_sha1(&secret, &[&transcript, &[4]]);
        assert_eq!(keys.recv_key[8..28], block4);

        let block1 = hmac_sha1(&secret, &[&transcript, &[1]]);
        assert_eq!(keys.challenge, hmac_sha1(&block1, &[&transcript]));
    }

    #[test]
    fn test_transcript_changes_keys() {
        let secret = [9u8; 96];
        let a = derive_session_keys(&secret, b"transcript-a");
        let b = derive_session_keys(&secret, b"transcript-b");
        assert_ne!(a.send_key, b.send_key);
        assert_ne!(a.challenge, b.challenge);
    }
}

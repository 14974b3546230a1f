//! Known-answer and property tests for the protocol primitives.
//!
//! Covers:
//! - Base62 catalog id decoding
//! - RFC 2409 group arithmetic and DH symmetry
//! - Shannon packet round trips and tamper detection
//! - AES-CTR seek consistency

use proptest::prelude::*;
use rand_core::OsRng;
use sonar_crypto::aes_ctr::FileCipher;
use sonar_crypto::base62;
use sonar_crypto::dh::{PrivateKey, PublicKey};
use sonar_crypto::kdf::derive_session_keys;
use sonar_crypto::shannon::{ShannonRecv, ShannonSend};
use sonar_crypto::{DH_KEY_SIZE, DH_PRIVATE_KEY_SIZE};

// ============================================================================
// Base62
// ============================================================================

#[test]
fn test_base62_catalog_vector() {
    let id = base62::decode("4gtj0ZuMWRw8WioT9SXsC2").unwrap();
    assert_eq!(hex::encode(id), "8c283882b29346829b8d021f52f5c2ce");
}

// ============================================================================
// Diffie-Hellman
// ============================================================================

#[test]
fn test_dh_generator_squared() {
    // x = 2 gives g^2 = 4
    let mut bytes = [0u8; DH_PRIVATE_KEY_SIZE];
    bytes[DH_PRIVATE_KEY_SIZE - 1] = 2;
    let public = PrivateKey::from_bytes(bytes).public_key();
    assert_eq!(public.as_bytes()[DH_KEY_SIZE - 1], 4);
    assert!(public.as_bytes()[..DH_KEY_SIZE - 1].iter().all(|&b| b == 0));
}

#[test]
fn test_handshake_keys_mirror() {
    let client = PrivateKey::generate(&mut OsRng);
    let server = PrivateKey::generate(&mut OsRng);
    let transcript = b"client-hello||ap-response";

    let client_secret = client.exchange(&server.public_key()).unwrap();
    let server_secret = server.exchange(&client.public_key()).unwrap();

    let client_keys = derive_session_keys(client_secret.as_bytes(), transcript);
    let server_keys = derive_session_keys(server_secret.as_bytes(), transcript);

    // the server uses our send key to receive and vice versa
    let mut tx = ShannonSend::new(&client_keys.send_key);
    let mut rx = ShannonRecv::new(&server_keys.send_key);
    let packet = tx.seal(0xab, b"login").unwrap();
    let opened = rx.open(&packet).unwrap().unwrap();
    assert_eq!(opened.payload, b"login");
    assert_eq!(client_keys.challenge, server_keys.challenge);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn dh_symmetry(a in prop::array::uniform32(any::<u8>()), b in prop::array::uniform32(any::<u8>())) {
        let mut ka = [0u8; DH_PRIVATE_KEY_SIZE];
        let mut kb = [0u8; DH_PRIVATE_KEY_SIZE];
        ka[DH_PRIVATE_KEY_SIZE - 32..].copy_from_slice(&a);
        kb[DH_PRIVATE_KEY_SIZE - 32..].copy_from_slice(&b);
        ka[0] = 0x80;
        kb[0] = 0x80;

        let alice = PrivateKey::from_bytes(ka);
        let bob = PrivateKey::from_bytes(kb);

        let ab = alice.exchange(&bob.public_key()).unwrap();
        let ba = bob.exchange(&alice.public_key()).unwrap();
        prop_assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn public_value_padding(raw in prop::collection::vec(any::<u8>(), 1..=DH_KEY_SIZE)) {
        let public = PublicKey::from_slice(&raw).unwrap();
        prop_assert_eq!(&public.as_bytes()[DH_KEY_SIZE - raw.len()..], &raw[..]);
    }
}

// ============================================================================
// Shannon transport
// ============================================================================

proptest! {
    #[test]
    fn shannon_roundtrip(
        key in prop::array::uniform32(any::<u8>()),
        cmd in any::<u8>(),
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
    ) {
        let mut tx = ShannonSend::new(&key);
        let mut rx = ShannonRecv::new(&key);

        for payload in &payloads {
            let packet = tx.seal(cmd, payload).unwrap();
            let opened = rx.open(&packet).unwrap().unwrap();
            prop_assert_eq!(opened.cmd, cmd);
            prop_assert_eq!(&opened.payload, payload);
            prop_assert_eq!(opened.consumed, packet.len());
        }
    }

    #[test]
    fn shannon_single_byte_corruption(
        key in prop::array::uniform32(any::<u8>()),
        payload in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut tx = ShannonSend::new(&key);
        let mut packet = tx.seal(0x09, &payload).unwrap();
        let i = index.index(packet.len());
        packet[i] ^= flip;

        let mut rx = ShannonRecv::new(&key);
        match rx.open(&packet) {
            // corrupting the length can only ask for more bytes
            Ok(None) => prop_assert!(i < 3),
            Ok(Some(_)) => prop_assert!(false, "corrupted packet accepted"),
            Err(_) => {}
        }
    }
}

// ============================================================================
// AES-CTR
// ============================================================================

proptest! {
    #[test]
    fn aes_ctr_seek_matches_linear(
        key in prop::array::uniform16(any::<u8>()),
        offset in 0usize..4096,
    ) {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
        let mut linear = data.clone();
        FileCipher::new(key).decrypt(&mut linear);

        let mut cipher = FileCipher::new(key);
        cipher.seek(offset as u64);
        let mut tail = data[offset..].to_vec();
        cipher.decrypt(&mut tail);
        prop_assert_eq!(&tail[..], &linear[offset..]);
    }
}

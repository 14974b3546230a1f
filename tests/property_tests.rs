//! Property-based tests for SONAR
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Transport Framing Properties
// ============================================================================

mod transport_properties {
    use super::*;
    use sonar_crypto::shannon::{ShannonRecv, ShannonSend};

    proptest! {
        /// A sealed stream opens to the same packets however it is split
        #[test]
        fn packets_survive_any_fragmentation(
            key in any::<[u8; 32]>(),
            packets in prop::collection::vec((any::<u8>(), prop::collection::vec(any::<u8>(), 0..300)), 1..12),
            cuts in prop::collection::vec(1usize..64, 1..40),
        ) {
            let mut send = ShannonSend::new(&key);
            let mut wire = Vec::new();
            for (cmd, payload) in &packets {
                wire.extend(send.seal(*cmd, payload).unwrap());
            }

            let mut recv = ShannonRecv::new(&key);
            let mut buf = Vec::new();
            let mut opened = Vec::new();
            let mut rest = wire.as_slice();
            let mut cut = cuts.iter().cycle();
            while !rest.is_empty() {
                let n = (*cut.next().unwrap()).min(rest.len());
                buf.extend_from_slice(&rest[..n]);
                rest = &rest[n..];
                while let Some(packet) = recv.open(&buf).unwrap() {
                    buf.drain(..packet.consumed);
                    opened.push((packet.cmd, packet.payload));
                }
            }

            prop_assert!(buf.is_empty());
            prop_assert_eq!(opened, packets);
            prop_assert_eq!(recv.nonce(), send.nonce());
        }

        /// Flipping any byte of a sealed packet is detected
        #[test]
        fn tampering_is_detected(
            key in any::<[u8; 32]>(),
            payload in prop::collection::vec(any::<u8>(), 0..200),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut sealed = ShannonSend::new(&key).seal(0x09, &payload).unwrap();
            let at = index.index(sealed.len());
            sealed[at] ^= flip;

            let mut recv = ShannonRecv::new(&key);
            match recv.open(&sealed) {
                Err(_) => {}
                // a corrupted length may announce a longer packet
                Ok(None) => prop_assert!(at < 3),
                Ok(Some(packet)) => prop_assert!(false, "tampered packet opened: {packet:?}"),
            }
        }
    }
}

// ============================================================================
// File Cipher Properties
// ============================================================================

mod cipher_properties {
    use super::*;
    use sonar_crypto::aes_ctr::FileCipher;

    proptest! {
        /// Decrypting from a seek target matches the same bytes of a full pass
        #[test]
        fn seek_matches_sequential_decryption(
            key in any::<[u8; 16]>(),
            data in prop::collection::vec(any::<u8>(), 1..2048),
            offset in any::<prop::sample::Index>(),
        ) {
            let start = offset.index(data.len());
            let mut full = data.clone();
            FileCipher::new(key).decrypt(&mut full);

            let mut tail = data[start..].to_vec();
            let mut cipher = FileCipher::new(key);
            cipher.seek(start as u64);
            cipher.decrypt(&mut tail);

            prop_assert_eq!(&tail[..], &full[start..]);
            prop_assert_eq!(cipher.position(), data.len() as u64);
        }
    }
}

// ============================================================================
// Packet Codec Properties
// ============================================================================

mod packet_properties {
    use super::*;
    use sonar_core::packet::{self, FILE_ID_SIZE, MercuryFrame};

    proptest! {
        /// The sequence can be read without decoding the parts
        #[test]
        fn mercury_seq_matches_frame(
            seq in any::<u64>(),
            flags in any::<u8>(),
            parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..5),
        ) {
            let frame = MercuryFrame { seq, flags, parts };
            let encoded = frame.encode().unwrap();
            prop_assert_eq!(packet::mercury_seq(&encoded).unwrap(), seq);
            prop_assert_eq!(MercuryFrame::decode(&encoded).unwrap(), frame);
        }

        /// Decoders reject or accept garbage without panicking
        #[test]
        fn decoders_never_panic(data in prop::collection::vec(any::<u8>(), 0..128)) {
            let _ = MercuryFrame::decode(&data);
            let _ = packet::mercury_seq(&data);
            let _ = packet::split_channel(&data);
            let _ = packet::key_reply_seq(&data);
            let _ = packet::parse_aes_key(&data);
            let _ = packet::parse_key_error(&data);
        }

        /// Chunk requests carry channel, file id and word range at fixed offsets
        #[test]
        fn chunk_request_layout(
            channel in any::<u16>(),
            file_id in any::<[u8; FILE_ID_SIZE]>(),
            start in any::<u32>(),
            end in any::<u32>(),
        ) {
            let request = packet::chunk_request(channel, &file_id, start, end);
            prop_assert_eq!(request.len(), 46);
            prop_assert_eq!(&request[..2], &channel.to_be_bytes());
            prop_assert_eq!(&request[18..38], &file_id[..]);
            prop_assert_eq!(&request[38..42], &start.to_be_bytes());
            prop_assert_eq!(&request[42..], &end.to_be_bytes());
        }
    }
}

// ============================================================================
// Catalog URI Properties
// ============================================================================

mod uri_properties {
    use super::*;
    use sonar_core::{CatalogUri, MediaKind};
    use sonar_crypto::base62;

    proptest! {
        /// Every media id has a URI and an open link that parse back to it
        #[test]
        fn uri_forms_agree(media_id in any::<[u8; 16]>(), episode in any::<bool>()) {
            let kind = if episode { "episode" } else { "track" };
            let id = base62::encode(&media_id);

            let uri: CatalogUri = format!("spotify:{kind}:{id}").parse().unwrap();
            let link: CatalogUri = format!("https://open.spotify.com/{kind}/{id}?si=abc").parse().unwrap();

            prop_assert_eq!(uri.media_id, media_id);
            prop_assert_eq!(uri.kind, if episode { MediaKind::Episode } else { MediaKind::Track });
            prop_assert_eq!(&uri, &link);
            prop_assert_eq!(uri.to_string(), format!("spotify:{kind}:{id}"));
        }

        /// Parsing arbitrary text never panics
        #[test]
        fn uri_parse_never_panics(text in ".{0,64}") {
            let _ = text.parse::<CatalogUri>();
        }
    }
}

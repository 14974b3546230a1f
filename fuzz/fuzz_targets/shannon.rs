//! Fuzz target for the Shannon packet layer
//!
//! Opening attacker-controlled bytes must never panic, and a sealed packet
//! must always open to what was sealed.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sonar_crypto::shannon::{ShannonRecv, ShannonSend};

#[derive(Debug, Arbitrary)]
struct ShannonInput {
    key: [u8; 32],
    cmd: u8,
    payload: Vec<u8>,
    garbage: Vec<u8>,
}

fuzz_target!(|input: ShannonInput| {
    let _ = ShannonRecv::new(&input.key).open(&input.garbage);

    if let Ok(sealed) = ShannonSend::new(&input.key).seal(input.cmd, &input.payload) {
        let packet = ShannonRecv::new(&input.key)
            .open(&sealed)
            .expect("sealed packet must authenticate")
            .expect("sealed packet must be complete");
        assert_eq!(packet.cmd, input.cmd);
        assert_eq!(packet.payload, input.payload);
        assert_eq!(packet.consumed, sealed.len());
    }
});

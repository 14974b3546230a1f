//! Fuzz target for access-point packet parsing
//!
//! Every payload decoder must return Ok or Err on arbitrary input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sonar_core::packet::{self, MercuryFrame};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = MercuryFrame::decode(data) {
        // seq is readable without decoding the parts
        assert_eq!(packet::mercury_seq(data).ok(), Some(frame.seq));
    }

    let _ = packet::split_channel(data);
    let _ = packet::key_reply_seq(data);
    let _ = packet::parse_aes_key(data);
    let _ = packet::parse_key_error(data);
});

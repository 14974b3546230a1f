//! Fuzz target for metadata replies and audio file selection

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sonar_core::{Bitrate, CatalogUri, MediaKind, mercury};

#[derive(Debug, Arbitrary)]
struct MetadataInput {
    media_id: [u8; 16],
    episode: bool,
    reply: Vec<u8>,
    body: Vec<u8>,
}

fuzz_target!(|input: MetadataInput| {
    let _ = mercury::parse_metadata_reply(&input.reply);

    let uri = CatalogUri {
        kind: if input.episode { MediaKind::Episode } else { MediaKind::Track },
        media_id: input.media_id,
    };
    for bitrate in [Bitrate::B96, Bitrate::B160, Bitrate::B320, Bitrate::Any] {
        let _ = mercury::select_file(&uri, &input.body, bitrate);
    }
});

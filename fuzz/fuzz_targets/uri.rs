//! Fuzz target for catalog URI and base62 parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use sonar_core::CatalogUri;
use sonar_crypto::base62;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(uri) = text.parse::<CatalogUri>() {
            // canonical form parses back to the same id
            let again: CatalogUri = uri.to_string().parse().expect("canonical uri must parse");
            assert_eq!(again, uri);
        }

        if let Ok(id) = base62::decode(text) {
            assert_eq!(base62::decode(&base62::encode(&id)).ok(), Some(id));
        }
    }
});

#![no_main]

use engram_core::format::{decode_vectors, IndexHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = IndexHeader::from_bytes(data) {
        if let Ok(vectors) = decode_vectors(data, &header) {
            assert_eq!(vectors.len() as u64, header.count * header.dimensions as u64);
        }
    }
});

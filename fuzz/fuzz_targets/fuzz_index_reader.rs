#![no_main]

use baix::index::{IndexReader, IndexSource};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever passes validation must decode every reference and answer queries
    if let Ok(reader) = IndexReader::from_bytes(data.to_vec()) {
        for reference in 0..reader.reference_count() {
            let _ = reader.content_for(reference).unwrap();
            let _ = reader.query_chunks(reference, 1, 1 << 20);
        }
        let _ = reader.start_of_last_linear_bin();
    }
});

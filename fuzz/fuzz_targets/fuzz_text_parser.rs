#![no_main]

use baix::index::parse_text_index;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsed content must never carry duplicate bins
    if let Ok(contents) = parse_text_index(data) {
        for reference in &contents.references {
            reference.validate().unwrap();
        }
    }
});

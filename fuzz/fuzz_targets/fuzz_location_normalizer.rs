#![no_main]
use libfuzzer_sys::fuzz_target;

use nekretnine_search::normalize::location::normalize_location;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = normalize_location(text);
    }
});

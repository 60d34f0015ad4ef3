#![no_main]
use libfuzzer_sys::fuzz_target;

use nekretnine_search::normalize::amenities::map_amenities;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let tokens: Vec<String> = text.split(',').map(String::from).collect();
        let _ = map_amenities(&tokens, Some(text));
    }
});

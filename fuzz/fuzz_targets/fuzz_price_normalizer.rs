#![no_main]
use libfuzzer_sys::fuzz_target;

use nekretnine_search::domain::listing::ListingType;
use nekretnine_search::normalize::price::normalize_price;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let rent = normalize_price(text, ListingType::Rent);
        assert!(rent.price >= 0);
        assert_eq!(rent.currency, "EUR");
        let sale = normalize_price(text, ListingType::Sale);
        assert!(!sale.is_monthly);
    }
});

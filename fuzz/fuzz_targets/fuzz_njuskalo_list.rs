#![no_main]
use libfuzzer_sys::fuzz_target;

use nekretnine_search::domain::listing::{ListingType, PropertyType};
use nekretnine_search::scrape::SourceScraper;
use nekretnine_search::scrape::sources::njuskalo::NjuskaloScraper;

fuzz_target!(|data: &[u8]| {
    if let Ok(html) = std::str::from_utf8(data) {
        let scraper = NjuskaloScraper::new(
            "https://www.njuskalo.hr",
            ListingType::Rent,
            PropertyType::Apartment,
        );
        let _ = scraper.parse_list(html);
        let _ = scraper.parse_detail(html, "https://www.njuskalo.hr/nekretnine/oglas-1");
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;

use nekretnine_search::domain::listing::{ListingType, PropertyType};
use nekretnine_search::scrape::SourceScraper;
use nekretnine_search::scrape::sources::index_oglasi::IndexOglasiScraper;

fuzz_target!(|data: &[u8]| {
    if let Ok(html) = std::str::from_utf8(data) {
        let scraper = IndexOglasiScraper::new(
            "https://www.index.hr/oglasi",
            ListingType::Rent,
            PropertyType::Apartment,
        );
        let _ = scraper.parse_list(html);
        let _ = scraper.parse_detail(html, "https://www.index.hr/oglasi/nekretnine/1");
    }
});

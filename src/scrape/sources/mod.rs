pub mod index_oglasi;
pub mod njuskalo;
pub mod oglasnik;

use crate::domain::listing::{ListingType, PropertyType};
use crate::scrape::SourceScraper;

use index_oglasi::IndexOglasiScraper;
use njuskalo::NjuskaloScraper;
use oglasnik::OglasnikScraper;

/// The production scraper fleet: rent and sale apartment sections of each
/// supported site. The worker filters this set per job.
pub fn default_fleet() -> Vec<Box<dyn SourceScraper>> {
    let mut fleet: Vec<Box<dyn SourceScraper>> = Vec::new();
    for listing_type in [ListingType::Rent, ListingType::Sale] {
        fleet.push(Box::new(NjuskaloScraper::new(
            njuskalo::DEFAULT_BASE_URL,
            listing_type,
            PropertyType::Apartment,
        )));
        fleet.push(Box::new(IndexOglasiScraper::new(
            index_oglasi::DEFAULT_BASE_URL,
            listing_type,
            PropertyType::Apartment,
        )));
        fleet.push(Box::new(OglasnikScraper::new(
            oglasnik::DEFAULT_BASE_URL,
            listing_type,
            PropertyType::Apartment,
        )));
    }
    fleet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fleet_covers_rent_and_sale() {
        let fleet = default_fleet();
        assert_eq!(fleet.len(), 6);
        assert!(fleet.iter().any(|s| s.listing_type() == ListingType::Rent));
        assert!(fleet.iter().any(|s| s.listing_type() == ListingType::Sale));
        let sources: std::collections::BTreeSet<&str> =
            fleet.iter().map(|s| s.source()).collect();
        assert_eq!(sources.len(), 3);
    }
}

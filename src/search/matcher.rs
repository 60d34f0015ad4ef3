use serde::{Deserialize, Serialize};

use crate::domain::filters::ExtractedFilters;
use crate::domain::listing::Listing;

/// Price deviation that still earns partial credit.
const PRICE_TOLERANCE: f64 = 0.10;
/// Price deviation the hard gate still admits. The 10–15% band ranks purely
/// on the other factors.
const PRICE_HARD_TOLERANCE: f64 = 0.15;
const SURFACE_TOLERANCE: f64 = 0.15;
const ROOMS_OFF_BY_ONE_SCORE: f64 = 0.7;
const UNKNOWN_NEUTRAL_SCORE: f64 = 0.5;

/// Per-field weights. Overridable at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterWeights {
    pub price: f64,
    pub location: f64,
    pub rooms: f64,
    pub listing_type: f64,
    pub property_type: f64,
    pub surface_area: f64,
    pub amenities: f64,
}

impl Default for FilterWeights {
    fn default() -> Self {
        Self {
            price: 1.5,
            location: 1.3,
            rooms: 1.2,
            listing_type: 1.1,
            property_type: 1.0,
            surface_area: 1.0,
            amenities: 0.8,
        }
    }
}

/// A field that matched partially, with enough detail to explain why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialMatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
    /// Score for this field as a percentage.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    /// Weighted score in [0, 1]; 1.0 when no filters are set.
    pub score: f64,
    pub matched: Vec<String>,
    pub unmatched: Vec<String>,
    pub partial: Vec<PartialMatch>,
}

struct FieldScore {
    field: &'static str,
    weight: f64,
    score: f64,
    expected: String,
    actual: String,
}

pub struct FilterMatcher {
    weights: FilterWeights,
}

impl Default for FilterMatcher {
    fn default() -> Self {
        Self::new(FilterWeights::default())
    }
}

impl FilterMatcher {
    pub fn new(weights: FilterWeights) -> Self {
        Self { weights }
    }

    /// Score one listing against the filter set.
    pub fn score(&self, listing: &Listing, filters: &ExtractedFilters) -> MatchResult {
        let mut fields: Vec<FieldScore> = Vec::new();

        if let Some(expected) = filters.listing_type {
            fields.push(FieldScore {
                field: "listing_type",
                weight: self.weights.listing_type,
                score: f64::from(u8::from(listing.listing_type == expected)),
                expected: expected.as_str().into(),
                actual: listing.listing_type.as_str().into(),
            });
        }

        if let Some(expected) = filters.property_type {
            fields.push(FieldScore {
                field: "property_type",
                weight: self.weights.property_type,
                score: f64::from(u8::from(listing.property_type == expected)),
                expected: expected.as_str().into(),
                actual: listing.property_type.as_str().into(),
            });
        }

        if filters.price_min.is_some() || filters.price_max.is_some() {
            let score = price_score(listing.price, filters.price_min, filters.price_max);
            fields.push(FieldScore {
                field: "price",
                weight: self.weights.price,
                score,
                expected: format_range(filters.price_min, filters.price_max, "€"),
                actual: format!("{}€", listing.price),
            });
        }

        if let Some(ref location) = filters.location {
            fields.push(FieldScore {
                field: "location",
                weight: self.weights.location,
                score: location_score(listing, location),
                expected: location.clone(),
                actual: listing.city.clone(),
            });
        }

        if filters.rooms_min.is_some() || filters.rooms_max.is_some() {
            let score = rooms_score(listing.rooms, filters.rooms_min, filters.rooms_max);
            fields.push(FieldScore {
                field: "rooms",
                weight: self.weights.rooms,
                score,
                expected: format_range(
                    filters.rooms_min.map(i64::from),
                    filters.rooms_max.map(i64::from),
                    "",
                ),
                actual: listing
                    .rooms
                    .map_or_else(|| "unknown".into(), |r| r.to_string()),
            });
        }

        if filters.surface_area_min.is_some() || filters.surface_area_max.is_some() {
            let score = surface_score(
                listing.surface_area_m2,
                filters.surface_area_min,
                filters.surface_area_max,
            );
            fields.push(FieldScore {
                field: "surface_area",
                weight: self.weights.surface_area,
                score,
                expected: format_range(
                    filters.surface_area_min.map(|v| v as i64),
                    filters.surface_area_max.map(|v| v as i64),
                    "m²",
                ),
                actual: listing
                    .surface_area_m2
                    .map_or_else(|| "unknown".into(), |v| format!("{v:.0}m²")),
            });
        }

        for (field, wanted, actual) in [
            ("has_parking", filters.has_parking, listing.amenities.has_parking),
            ("has_balcony", filters.has_balcony, listing.amenities.has_balcony),
            ("has_garage", filters.has_garage, listing.amenities.has_garage),
            ("is_furnished", filters.is_furnished, listing.amenities.is_furnished),
        ] {
            if let Some(wanted) = wanted {
                fields.push(FieldScore {
                    field,
                    weight: self.weights.amenities,
                    score: f64::from(u8::from(actual == wanted)),
                    expected: wanted.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        for amenity in &filters.amenities {
            let present = listing
                .amenities
                .present()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(amenity));
            fields.push(FieldScore {
                field: "amenities",
                weight: self.weights.amenities,
                score: f64::from(u8::from(present)),
                expected: amenity.clone(),
                actual: if present { "present" } else { "absent" }.into(),
            });
        }

        let total_weight: f64 = fields.iter().map(|f| f.weight).sum();
        if total_weight == 0.0 {
            return MatchResult {
                score: 1.0,
                ..Default::default()
            };
        }

        let matched_weight: f64 = fields.iter().map(|f| f.score * f.weight).sum();
        let mut result = MatchResult {
            score: matched_weight / total_weight,
            ..Default::default()
        };
        for field in fields {
            if field.score >= 1.0 {
                result.matched.push(field.field.to_string());
            } else if field.score <= 0.0 {
                result.unmatched.push(field.field.to_string());
            } else {
                result.partial.push(PartialMatch {
                    field: field.field.to_string(),
                    expected: field.expected,
                    actual: field.actual,
                    percentage: field.score * 100.0,
                });
            }
        }
        result
    }

    /// Remove candidates that can never satisfy the query: wrong listing
    /// type, or price beyond the hard budget band. Everything else stays
    /// soft and is handled by scoring.
    pub fn filter_by_hard_requirements(
        &self,
        listings: Vec<Listing>,
        filters: &ExtractedFilters,
    ) -> Vec<Listing> {
        listings
            .into_iter()
            .filter(|listing| {
                if let Some(expected) = filters.listing_type
                    && listing.listing_type != expected
                {
                    return false;
                }
                if let Some(max) = filters.price_max {
                    let hard_cap = max as f64 * (1.0 + PRICE_HARD_TOLERANCE);
                    if listing.price as f64 > hard_cap {
                        return false;
                    }
                }
                true
            })
            .collect()
    }
}

fn price_score(price: i64, min: Option<i64>, max: Option<i64>) -> f64 {
    let price = price as f64;
    if let Some(max) = max {
        let max = max as f64;
        if price > max {
            let overage = (price - max) / max;
            if overage > PRICE_TOLERANCE {
                return 0.0;
            }
            return 1.0 - overage / PRICE_TOLERANCE;
        }
    }
    if let Some(min) = min {
        let min = min as f64;
        if price < min {
            let shortfall = (min - price) / min;
            if shortfall > PRICE_TOLERANCE {
                return 0.0;
            }
            return 1.0 - shortfall / PRICE_TOLERANCE;
        }
    }
    1.0
}

fn location_score(listing: &Listing, wanted: &str) -> f64 {
    let wanted = wanted.to_lowercase();
    let city = listing.city.to_lowercase();
    let address = listing.address.to_lowercase();
    if city.contains(&wanted) || address.contains(&wanted) {
        return 1.0;
    }
    // Filter more specific than the listing city ("Zagreb Trešnjevka" vs
    // "Zagreb")
    if !city.is_empty() && wanted.contains(&city) {
        return 0.5;
    }
    0.0
}

fn rooms_score(rooms: Option<u32>, min: Option<u32>, max: Option<u32>) -> f64 {
    let Some(rooms) = rooms else {
        return UNKNOWN_NEUTRAL_SCORE;
    };
    let below = min.map_or(0, |min| min.saturating_sub(rooms));
    let above = max.map_or(0, |max| rooms.saturating_sub(max));
    match below.max(above) {
        0 => 1.0,
        1 => ROOMS_OFF_BY_ONE_SCORE,
        _ => 0.0,
    }
}

fn surface_score(area: Option<f64>, min: Option<f64>, max: Option<f64>) -> f64 {
    let Some(area) = area else {
        return UNKNOWN_NEUTRAL_SCORE;
    };
    if let Some(min) = min
        && area < min
    {
        let shortfall = (min - area) / min;
        if shortfall > SURFACE_TOLERANCE {
            return 0.0;
        }
        return 1.0 - shortfall / SURFACE_TOLERANCE;
    }
    if let Some(max) = max
        && area > max
    {
        let overage = (area - max) / max;
        if overage > SURFACE_TOLERANCE {
            return 0.0;
        }
        return 1.0 - overage / SURFACE_TOLERANCE;
    }
    1.0
}

fn format_range(min: Option<i64>, max: Option<i64>, unit: &str) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}-{max}{unit}"),
        (Some(min), None) => format!("≥{min}{unit}"),
        (None, Some(max)) => format!("≤{max}{unit}"),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::{Amenities, ListingType, PropertyType};
    use chrono::Utc;
    use uuid::Uuid;

    fn listing() -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            source: "njuskalo".into(),
            external_id: "1".into(),
            url: "https://example.com/oglas-1".into(),
            title: "Stan".into(),
            description: String::new(),
            images: vec![],
            price: 700,
            currency: "EUR".into(),
            listing_type: ListingType::Rent,
            property_type: PropertyType::Apartment,
            city: "Zagreb".into(),
            address: "Trešnjevka".into(),
            latitude: None,
            longitude: None,
            rooms: Some(2),
            bedrooms: None,
            bathrooms: None,
            surface_area_m2: Some(60.0),
            amenities: Amenities {
                has_parking: true,
                has_balcony: false,
                has_garage: false,
                is_furnished: true,
                extra: Default::default(),
            },
            embedding: None,
            scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn matcher() -> FilterMatcher {
        FilterMatcher::default()
    }

    #[test]
    fn empty_filters_score_one() {
        let result = matcher().score(&listing(), &ExtractedFilters::default());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.matched.is_empty());
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn full_match_scores_one() {
        let filters = ExtractedFilters {
            listing_type: Some(ListingType::Rent),
            property_type: Some(PropertyType::Apartment),
            price_max: Some(700),
            location: Some("Zagreb".into()),
            rooms_min: Some(2),
            rooms_max: Some(2),
            has_parking: Some(true),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters);
        assert!((result.score - 1.0).abs() < 1e-9);
        assert!(result.unmatched.is_empty());
        assert!(result.partial.is_empty());
        assert!(result.matched.contains(&"price".to_string()));
    }

    #[test]
    fn price_exactly_ten_percent_over_scores_zero() {
        let filters = ExtractedFilters {
            price_max: Some(700),
            ..Default::default()
        };
        let mut l = listing();
        l.price = 770; // exactly +10%
        let result = matcher().score(&l, &filters);
        assert!(result.score.abs() < 1e-9);
        assert!(result.unmatched.contains(&"price".to_string()));
    }

    #[test]
    fn price_five_percent_over_scores_half() {
        let filters = ExtractedFilters {
            price_max: Some(700),
            ..Default::default()
        };
        let mut l = listing();
        l.price = 735; // +5%
        let result = matcher().score(&l, &filters);
        assert!((result.score - 0.5).abs() < 1e-9);
        assert_eq!(result.partial.len(), 1);
        assert_eq!(result.partial[0].field, "price");
        assert!((result.partial[0].percentage - 50.0).abs() < 1e-6);
    }

    #[test]
    fn price_under_minimum_band() {
        let filters = ExtractedFilters {
            price_min: Some(1000),
            ..Default::default()
        };
        let mut l = listing();
        l.price = 950; // -5%
        let result = matcher().score(&l, &filters);
        assert!((result.score - 0.5).abs() < 1e-9);

        l.price = 899; // just past -10%
        let result = matcher().score(&l, &filters);
        assert!(result.score.abs() < 1e-9);
    }

    #[test]
    fn location_exact_and_reverse_substring() {
        let filters_exact = ExtractedFilters {
            location: Some("Zagreb".into()),
            ..Default::default()
        };
        assert!((matcher().score(&listing(), &filters_exact).score - 1.0).abs() < 1e-9);

        // Address-level match
        let filters_address = ExtractedFilters {
            location: Some("Trešnjevka".into()),
            ..Default::default()
        };
        assert!((matcher().score(&listing(), &filters_address).score - 1.0).abs() < 1e-9);

        // Filter more specific than listing city
        let filters_specific = ExtractedFilters {
            location: Some("Zagreb Jarun".into()),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters_specific);
        assert!((result.score - 0.5).abs() < 1e-9);

        let filters_other = ExtractedFilters {
            location: Some("Split".into()),
            ..Default::default()
        };
        assert!(matcher().score(&listing(), &filters_other).score.abs() < 1e-9);
    }

    #[test]
    fn rooms_off_by_one_scores_partial() {
        let filters = ExtractedFilters {
            rooms_min: Some(3),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters); // has 2 rooms
        assert!((result.score - 0.7).abs() < 1e-9);

        let filters_far = ExtractedFilters {
            rooms_min: Some(4),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters_far);
        assert!(result.score.abs() < 1e-9);
    }

    #[test]
    fn unknown_rooms_neutral() {
        let filters = ExtractedFilters {
            rooms_min: Some(2),
            ..Default::default()
        };
        let mut l = listing();
        l.rooms = None;
        let result = matcher().score(&l, &filters);
        assert!((result.score - 0.5).abs() < 1e-9);
        assert_eq!(result.partial[0].actual, "unknown");
    }

    #[test]
    fn surface_tolerance_linear_falloff() {
        let filters = ExtractedFilters {
            surface_area_min: Some(70.0),
            ..Default::default()
        };
        let mut l = listing();
        l.surface_area_m2 = Some(64.75); // 7.5% below → half credit
        let result = matcher().score(&l, &filters);
        assert!((result.score - 0.5).abs() < 1e-6);

        l.surface_area_m2 = Some(50.0); // far below
        assert!(matcher().score(&l, &filters).score.abs() < 1e-9);
    }

    #[test]
    fn amenity_mismatch_contributes_zero() {
        let filters = ExtractedFilters {
            has_balcony: Some(true),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters);
        assert!(result.score.abs() < 1e-9);
        assert!(result.unmatched.contains(&"has_balcony".to_string()));
    }

    #[test]
    fn extra_amenity_list_matches_by_name() {
        let mut l = listing();
        l.amenities.extra.insert("lift".into(), true);
        let filters = ExtractedFilters {
            amenities: vec!["lift".into(), "bazen".into()],
            ..Default::default()
        };
        let result = matcher().score(&l, &filters);
        // one of two amenity entries matched
        assert!((result.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn weighted_combination() {
        // price (1.5) matched, location (1.3) unmatched → 1.5 / 2.8
        let filters = ExtractedFilters {
            price_max: Some(700),
            location: Some("Split".into()),
            ..Default::default()
        };
        let result = matcher().score(&listing(), &filters);
        assert!((result.score - 1.5 / 2.8).abs() < 1e-9);
    }

    #[test]
    fn hard_filter_listing_type() {
        let filters = ExtractedFilters {
            listing_type: Some(ListingType::Sale),
            ..Default::default()
        };
        let kept = matcher().filter_by_hard_requirements(vec![listing()], &filters);
        assert!(kept.is_empty());
    }

    #[test]
    fn hard_filter_price_band() {
        let filters = ExtractedFilters {
            price_max: Some(700),
            ..Default::default()
        };
        let mut at_cap = listing();
        at_cap.price = 805; // exactly +15%
        let mut over_cap = listing();
        over_cap.price = 806;
        let kept = matcher().filter_by_hard_requirements(vec![at_cap, over_cap], &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].price, 805);
    }

    #[test]
    fn hard_filter_keeps_soft_mismatches() {
        // Location and rooms are soft; they must survive the hard gate
        let filters = ExtractedFilters {
            location: Some("Split".into()),
            rooms_min: Some(4),
            ..Default::default()
        };
        let kept = matcher().filter_by_hard_requirements(vec![listing()], &filters);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn custom_weights_respected() {
        let weights = FilterWeights {
            price: 2.0,
            location: 1.0,
            ..Default::default()
        };
        let matcher = FilterMatcher::new(weights);
        let filters = ExtractedFilters {
            price_max: Some(700),
            location: Some("Split".into()),
            ..Default::default()
        };
        let result = matcher.score(&listing(), &filters);
        assert!((result.score - 2.0 / 3.0).abs() < 1e-9);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::filters::ExtractedFilters;
use crate::domain::listing::Listing;
use crate::ports::listing_store::ScoredListing;
use crate::search::matcher::{FilterMatcher, MatchResult};

/// Weights for the combined score. Must be swapped wholesale for the
/// fallback path, hence a value type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingWeights {
    pub semantic: f64,
    pub filter: f64,
    pub recency: f64,
    pub freshness: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            filter: 0.4,
            recency: 0.1,
            freshness: 0.1,
        }
    }
}

impl RankingWeights {
    /// Weights for the filter-only fallback path, where similarity carries
    /// no signal.
    pub fn fallback() -> Self {
        Self {
            semantic: 0.0,
            filter: 0.8,
            recency: 0.15,
            freshness: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingScores {
    pub semantic: f64,
    pub filter_match: f64,
    pub recency: f64,
    pub freshness: f64,
    pub combined: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedListing {
    pub listing: Listing,
    pub similarity: f64,
    pub scores: RankingScores,
    pub match_result: MatchResult,
}

pub struct RankingService {
    matcher: FilterMatcher,
}

impl Default for RankingService {
    fn default() -> Self {
        Self::new(FilterMatcher::default())
    }
}

impl RankingService {
    pub fn new(matcher: FilterMatcher) -> Self {
        Self { matcher }
    }

    /// Score and sort candidates, best first.
    pub fn rank(
        &self,
        candidates: Vec<ScoredListing>,
        filters: &ExtractedFilters,
        weights: &RankingWeights,
    ) -> Vec<RankedListing> {
        let now = Utc::now();
        let mut ranked: Vec<RankedListing> = candidates
            .into_iter()
            .map(|candidate| {
                let match_result = self.matcher.score(&candidate.listing, filters);
                let scores = compute_scores(
                    &candidate.listing,
                    candidate.similarity,
                    match_result.score,
                    weights,
                    now,
                );
                RankedListing {
                    listing: candidate.listing,
                    similarity: candidate.similarity,
                    scores,
                    match_result,
                }
            })
            .collect();
        sort_by_combined(&mut ranked);
        ranked
    }

    /// Recompute only the filter-match factor, e.g. after a mid-session
    /// filter update. Semantic, recency and freshness scores are kept.
    pub fn rerank(
        &self,
        ranked: Vec<RankedListing>,
        filters: &ExtractedFilters,
        weights: &RankingWeights,
    ) -> Vec<RankedListing> {
        let mut reranked: Vec<RankedListing> = ranked
            .into_iter()
            .map(|mut entry| {
                entry.match_result = self.matcher.score(&entry.listing, filters);
                entry.scores.filter_match = entry.match_result.score;
                entry.scores.combined = combine(&entry.scores, weights);
                entry
            })
            .collect();
        sort_by_combined(&mut reranked);
        reranked
    }

    /// Human-readable score breakdown; the debugging surface for "why is
    /// this listing ranked here".
    pub fn explain(result: &RankedListing) -> String {
        let mut out = format!(
            "{}\n  combined {:.3} = semantic {:.3} + filter {:.3} + recency {:.3} + freshness {:.3}\n",
            result.listing,
            result.scores.combined,
            result.scores.semantic,
            result.scores.filter_match,
            result.scores.recency,
            result.scores.freshness,
        );
        out.push_str(&format!(
            "  matched: [{}]\n  unmatched: [{}]\n",
            result.match_result.matched.join(", "),
            result.match_result.unmatched.join(", "),
        ));
        for partial in &result.match_result.partial {
            out.push_str(&format!(
                "  partial: {} expected {} got {} ({:.0}%)\n",
                partial.field, partial.expected, partial.actual, partial.percentage
            ));
        }
        out
    }
}

fn compute_scores(
    listing: &Listing,
    similarity: f64,
    filter_match: f64,
    weights: &RankingWeights,
    now: DateTime<Utc>,
) -> RankingScores {
    let mut scores = RankingScores {
        semantic: similarity.clamp(0.0, 1.0),
        filter_match,
        recency: recency_score(listing.created_at, now),
        freshness: freshness_score(listing.scraped_at, now),
        combined: 0.0,
    };
    scores.combined = combine(&scores, weights);
    scores
}

fn combine(scores: &RankingScores, weights: &RankingWeights) -> f64 {
    weights.semantic * scores.semantic
        + weights.filter * scores.filter_match
        + weights.recency * scores.recency
        + weights.freshness * scores.freshness
}

/// Linear 30-day decay on listing age; anything younger than a day scores
/// full.
fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(created_at);
    if age.num_days() < 1 {
        return 1.0;
    }
    let days = age.num_seconds() as f64 / 86_400.0;
    (1.0 - days / 30.0).clamp(0.0, 1.0)
}

/// Linear 168-hour decay on scrape age; anything scraped within the hour
/// scores full.
fn freshness_score(scraped_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(scraped_at);
    if age.num_hours() < 1 {
        return 1.0;
    }
    let hours = age.num_seconds() as f64 / 3600.0;
    (1.0 - hours / 168.0).clamp(0.0, 1.0)
}

fn sort_by_combined(ranked: &mut [RankedListing]) {
    ranked.sort_by(|a, b| {
        b.scores
            .combined
            .partial_cmp(&a.scores.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::{Amenities, ListingType, PropertyType};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn listing_aged(created_days: i64, scraped_hours: i64) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            source: "njuskalo".into(),
            external_id: Uuid::new_v4().to_string(),
            url: "https://example.com/oglas-1".into(),
            title: "Stan".into(),
            description: String::new(),
            images: vec![],
            price: 650,
            currency: "EUR".into(),
            listing_type: ListingType::Rent,
            property_type: PropertyType::Apartment,
            city: "Zagreb".into(),
            address: String::new(),
            latitude: None,
            longitude: None,
            rooms: Some(2),
            bedrooms: None,
            bathrooms: None,
            surface_area_m2: None,
            amenities: Amenities::default(),
            embedding: None,
            scraped_at: now - ChronoDuration::hours(scraped_hours),
            created_at: now - ChronoDuration::days(created_days),
            updated_at: now,
        }
    }

    fn candidate(similarity: f64, created_days: i64, scraped_hours: i64) -> ScoredListing {
        ScoredListing {
            listing: listing_aged(created_days, scraped_hours),
            similarity,
        }
    }

    #[test]
    fn fresh_full_match_combined_score() {
        let service = RankingService::default();
        let ranked = service.rank(
            vec![candidate(0.8, 0, 0)],
            &ExtractedFilters::default(),
            &RankingWeights::default(),
        );
        // 0.4*0.8 + 0.4*1 + 0.1*1 + 0.1*1 = 0.92
        assert!((ranked[0].scores.combined - 0.92).abs() < 1e-9);
    }

    #[test]
    fn combined_score_in_unit_interval_and_sorted() {
        let service = RankingService::default();
        let ranked = service.rank(
            vec![
                candidate(0.3, 40, 400),
                candidate(0.9, 0, 0),
                candidate(0.6, 10, 48),
            ],
            &ExtractedFilters::default(),
            &RankingWeights::default(),
        );
        for entry in &ranked {
            assert!((0.0..=1.0).contains(&entry.scores.combined));
        }
        for window in ranked.windows(2) {
            assert!(window[0].scores.combined >= window[1].scores.combined);
        }
        assert!((ranked[0].similarity - 0.9).abs() < 1e-9);
    }

    #[test]
    fn fresher_scrape_wins_tiebreak() {
        let service = RankingService::default();
        let ranked = service.rank(
            vec![candidate(0.8, 0, 336), candidate(0.8, 0, 0)],
            &ExtractedFilters::default(),
            &RankingWeights::default(),
        );
        assert!(ranked[0].listing.scraped_at > ranked[1].listing.scraped_at);
        assert!(ranked[0].scores.freshness > ranked[1].scores.freshness);
    }

    #[test]
    fn recency_decay_shape() {
        let now = Utc::now();
        assert!((recency_score(now, now) - 1.0).abs() < 1e-9);
        let at_15_days = recency_score(now - ChronoDuration::days(15), now);
        assert!((at_15_days - 0.5).abs() < 0.01);
        let at_60_days = recency_score(now - ChronoDuration::days(60), now);
        assert!(at_60_days.abs() < 1e-9);
    }

    #[test]
    fn freshness_decay_shape() {
        let now = Utc::now();
        assert!((freshness_score(now - ChronoDuration::minutes(30), now) - 1.0).abs() < 1e-9);
        let at_84_hours = freshness_score(now - ChronoDuration::hours(84), now);
        assert!((at_84_hours - 0.5).abs() < 0.01);
        assert!(freshness_score(now - ChronoDuration::hours(400), now).abs() < 1e-9);
    }

    #[test]
    fn rerank_is_idempotent_over_rank() {
        let service = RankingService::default();
        let filters = ExtractedFilters {
            price_max: Some(700),
            location: Some("Zagreb".into()),
            ..Default::default()
        };
        let weights = RankingWeights::default();
        let ranked = service.rank(
            vec![
                candidate(0.9, 1, 2),
                candidate(0.5, 3, 10),
                candidate(0.7, 0, 0),
            ],
            &filters,
            &weights,
        );
        let expected: Vec<(Uuid, f64)> = ranked
            .iter()
            .map(|r| (r.listing.id, r.scores.combined))
            .collect();

        let reranked = service.rerank(ranked, &filters, &weights);
        let actual: Vec<(Uuid, f64)> = reranked
            .iter()
            .map(|r| (r.listing.id, r.scores.combined))
            .collect();

        assert_eq!(expected.len(), actual.len());
        for ((id_a, score_a), (id_b, score_b)) in expected.iter().zip(actual.iter()) {
            assert_eq!(id_a, id_b);
            assert!((score_a - score_b).abs() < 1e-9);
        }
    }

    #[test]
    fn rerank_applies_new_filters() {
        let service = RankingService::default();
        let weights = RankingWeights::default();
        let ranked = service.rank(
            vec![candidate(0.8, 0, 0)],
            &ExtractedFilters::default(),
            &weights,
        );
        assert!((ranked[0].scores.filter_match - 1.0).abs() < 1e-9);

        let filters = ExtractedFilters {
            location: Some("Split".into()),
            ..Default::default()
        };
        let reranked = service.rerank(ranked, &filters, &weights);
        assert!(reranked[0].scores.filter_match.abs() < 1e-9);
        // Semantic part untouched
        assert!((reranked[0].scores.semantic - 0.8).abs() < 1e-9);
    }

    #[test]
    fn explain_lists_subscores_and_fields() {
        let service = RankingService::default();
        let filters = ExtractedFilters {
            price_max: Some(700),
            rooms_min: Some(3),
            ..Default::default()
        };
        let ranked = service.rank(vec![candidate(0.8, 0, 0)], &filters, &RankingWeights::default());
        let explanation = RankingService::explain(&ranked[0]);
        assert!(explanation.contains("combined"));
        assert!(explanation.contains("semantic 0.800"));
        assert!(explanation.contains("matched: [price]"));
        assert!(explanation.contains("partial: rooms"));
    }

    #[test]
    fn fallback_weights_favor_filters() {
        let weights = RankingWeights::fallback();
        assert!((weights.semantic - 0.0).abs() < f64::EPSILON);
        assert!((weights.filter - 0.8).abs() < f64::EPSILON);
        let sum = weights.semantic + weights.filter + weights.recency + weights.freshness;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::types::ScrapingConfig;
use crate::domain::listing::{Listing, ListingType, PropertyType, RawListingData, ScrapeResult};
use crate::error::{Error, Result};
use crate::normalize::amenities::map_amenities;
use crate::normalize::location::normalize_location;
use crate::normalize::price::normalize_price;
use crate::ports::listing_store::ListingStore;
use crate::scrape::pool::FetchPool;
use crate::scrape::rate_limiter::RateLimiter;
use crate::scrape::retry::{RetryPolicy, with_retry};
use crate::scrape::{CancelToken, SourceScraper, extract_external_id};

/// Shared template for every source scraper: acquire a session, walk list
/// pages in order, normalize and upsert each record, tally the outcome.
pub struct ScrapeRunner {
    store: Arc<dyn ListingStore>,
    pool: Arc<FetchPool>,
    config: ScrapingConfig,
}

impl ScrapeRunner {
    pub fn new(store: Arc<dyn ListingStore>, pool: Arc<FetchPool>, config: ScrapingConfig) -> Self {
        Self {
            store,
            pool,
            config,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_retries.max(1),
            initial_delay: Duration::from_millis(self.config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.config.retry_max_delay_ms),
            multiplier: self.config.retry_multiplier,
        }
    }

    fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.config.requests_per_minute,
            Duration::from_millis(self.config.delay_between_requests_ms),
            Duration::from_millis(self.config.delay_variance_ms),
            Duration::from_millis(self.config.detail_delay_ms),
        )
    }

    /// Scrape one source with a session borrowed from the pool. Jobs that
    /// run several scrapers should acquire once and use
    /// [`Self::run_with_client`] instead.
    pub async fn run(
        &self,
        scraper: &dyn SourceScraper,
        max_pages: Option<u32>,
        cancel: &CancelToken,
    ) -> ScrapeResult {
        let (handle, client) = match self.pool.acquire().await {
            Ok(pair) => pair,
            Err(e) => {
                let mut result = ScrapeResult::empty(scraper.source());
                result.success = false;
                result.errors.push(format!("session acquire failed: {e}"));
                return result;
            }
        };
        let result = self.run_with_client(scraper, &client, max_pages, cancel).await;
        self.pool.release(handle);
        result
    }

    /// The template loop. Per-page and per-listing failures are absorbed
    /// into the result.
    pub async fn run_with_client(
        &self,
        scraper: &dyn SourceScraper,
        client: &Client,
        max_pages: Option<u32>,
        cancel: &CancelToken,
    ) -> ScrapeResult {
        let source = scraper.source();
        let started = Instant::now();
        let mut result = ScrapeResult::empty(source);

        // Limiter and retry policy are per-run; politeness is per-site.
        let limiter = self.rate_limiter();
        let policy = self.retry_policy();

        let max_pages = max_pages.unwrap_or(self.config.max_pages).max(1);
        info!(source, max_pages, "Starting scrape");

        'pages: for page in 1..=max_pages {
            if cancel.is_cancelled() {
                info!(source, page, "Scrape cancelled");
                break;
            }

            limiter.throttle().await;
            let url = scraper.page_url(page);
            let context = format!("{source} page {page}");
            let parsed = with_retry(&policy, &context, || async {
                let html = fetch_page(client, &url).await?;
                scraper.parse_list(&html)
            })
            .await;

            let page_data = match parsed {
                Ok(data) => data,
                Err(e) => {
                    warn!(source, page, error = %e, "List page failed");
                    result.errors.push(format!("page {page}: {e}"));
                    continue;
                }
            };
            result.pages_processed += 1;

            for mut raw in page_data.listings {
                result.listings_scraped += 1;

                // List pages on some sites carry no description; fill it
                // from the detail page. A detail failure keeps the list
                // data.
                if raw.description.is_empty() && !raw.url.is_empty() {
                    if cancel.is_cancelled() {
                        break 'pages;
                    }
                    limiter.throttle_detail().await;
                    match fetch_page(client, &raw.url).await {
                        Ok(html) => match scraper.parse_detail(&html, &raw.url) {
                            Ok(detail) => merge_detail(&mut raw, detail),
                            Err(e) => debug!(source, url = %raw.url, error = %e, "Detail parse failed"),
                        },
                        Err(e) => debug!(source, url = %raw.url, error = %e, "Detail fetch failed"),
                    }
                }

                match normalize_raw(&raw, source, scraper.listing_type(), scraper.property_type()) {
                    Ok(listing) => match self.store.insert(listing).await {
                        Ok(outcome) if outcome.is_duplicate() => result.listings_duplicate += 1,
                        Ok(_) => result.listings_saved += 1,
                        Err(e) => result.errors.push(format!("store: {e}")),
                    },
                    Err(e) => result.errors.push(format!("normalize {}: {e}", raw.url)),
                }
            }

            if !page_data.pagination.has_next {
                debug!(source, page, "No further pages");
                break;
            }
        }

        result.success = result.errors.is_empty();
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            source,
            scraped = result.listings_scraped,
            saved = result.listings_saved,
            duplicates = result.listings_duplicate,
            errors = result.errors.len(),
            "Scrape finished"
        );
        result
    }
}

async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    debug!(url, "Fetching page");
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout {
                reason: format!("request to {url} timed out"),
            }
        } else if e.is_connect() {
            Error::Network {
                reason: format!("connection failed for {url}: {e}"),
            }
        } else {
            Error::Http(e)
        }
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(Error::RateLimited { retry_after_secs });
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::Navigation {
            reason: format!("page not found (404): {url}"),
        });
    }
    if !status.is_success() {
        return Err(Error::Navigation {
            reason: format!("HTTP {status} for {url}"),
        });
    }
    response.text().await.map_err(Error::Http)
}

fn merge_detail(raw: &mut RawListingData, detail: RawListingData) {
    if raw.description.is_empty() {
        raw.description = detail.description;
    }
    if raw.images.is_empty() {
        raw.images = detail.images;
    }
    if raw.rooms.is_none() {
        raw.rooms = detail.rooms;
    }
    if raw.surface_area_m2.is_none() {
        raw.surface_area_m2 = detail.surface_area_m2;
    }
    for token in detail.raw_amenities {
        if !raw.raw_amenities.contains(&token) {
            raw.raw_amenities.push(token);
        }
    }
    for (label, value) in detail.property_info {
        raw.property_info.entry(label).or_insert(value);
    }
}

// "sobe" alone would also match "spavaće sobe"
const ROOM_LABELS: &[&str] = &["broj soba", "sobnost"];
const BEDROOM_LABELS: &[&str] = &["spavaće sobe", "spavace sobe", "broj spavaćih soba"];
const BATHROOM_LABELS: &[&str] = &["broj kupaonica", "kupaonice", "kupaonica"];
const SURFACE_LABELS: &[&str] = &["stambena površina", "stambena povrsina", "površina", "povrsina", "kvadratura"];

/// Croatian room-count words used where sites label apartments by type
/// instead of a number.
const ROOM_WORDS: &[(&str, u32)] = &[
    ("garsonijera", 1),
    ("jednosoban", 1),
    ("jednoiposoban", 2),
    ("dvosoban", 2),
    ("dvoiposoban", 3),
    ("trosoban", 3),
    ("troiposoban", 4),
    ("četverosoban", 4),
    ("cetverosoban", 4),
    ("peterosoban", 5),
    ("petosoban", 5),
];

fn property_info_value<'a>(
    raw: &'a RawListingData,
    labels: &[&str],
) -> Option<&'a str> {
    for (label, value) in &raw.property_info {
        let key = label.to_lowercase();
        if labels.iter().any(|l| key.contains(l)) {
            return Some(value.as_str());
        }
    }
    None
}

fn parse_count(value: &str) -> Option<u32> {
    let lower = value.to_lowercase();
    let digits: String = lower
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if let Ok(n) = digits.parse::<u32>() {
        return Some(n);
    }
    ROOM_WORDS
        .iter()
        .find(|(word, _)| lower.contains(word))
        .map(|(_, n)| *n)
}

fn parse_surface(value: &str) -> Option<f64> {
    let token: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    token.trim_end_matches('.').parse::<f64>().ok()
}

/// Combine the raw record with the three normalizers into a canonical
/// listing.
pub fn normalize_raw(
    raw: &RawListingData,
    source: &str,
    listing_type: ListingType,
    property_type: PropertyType,
) -> Result<Listing> {
    if raw.url.is_empty() {
        return Err(Error::Parse {
            reason: "raw listing without url".into(),
        });
    }
    let external_id = if raw.external_id.is_empty() {
        extract_external_id(&raw.url)
    } else {
        raw.external_id.clone()
    };

    let price = normalize_price(&raw.price_text, listing_type);
    let location = normalize_location(&raw.location_text);
    let amenities = map_amenities(&raw.raw_amenities, Some(&raw.description));

    let rooms = raw
        .rooms
        .map(|r| r.round() as u32)
        .or_else(|| property_info_value(raw, ROOM_LABELS).and_then(parse_count))
        .or_else(|| parse_count(&raw.title));
    let bedrooms = property_info_value(raw, BEDROOM_LABELS).and_then(parse_count);
    let bathrooms = property_info_value(raw, BATHROOM_LABELS).and_then(parse_count);
    let surface_area_m2 = raw
        .surface_area_m2
        .or_else(|| property_info_value(raw, SURFACE_LABELS).and_then(parse_surface));

    let now = Utc::now();
    Ok(Listing {
        id: Uuid::new_v4(),
        source: source.to_string(),
        external_id,
        url: raw.url.clone(),
        title: raw.title.clone(),
        description: raw.description.clone(),
        images: raw.images.clone(),
        price: price.price,
        currency: price.currency,
        listing_type,
        property_type,
        city: location.city,
        address: location.address,
        latitude: None,
        longitude: None,
        rooms,
        bedrooms,
        bathrooms,
        surface_area_m2,
        amenities,
        embedding: None,
        scraped_at: now,
        created_at: now,
        updated_at: now,
    })
}

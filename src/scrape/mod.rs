pub mod pool;
pub mod rate_limiter;
pub mod retry;
pub mod runner;
pub mod sources;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::listing::{ListingType, ParsedPage, PropertyType, RawListingData};
use crate::error::Result;

/// Per-site scraper: URL scheme plus list/detail parsers. Traversal,
/// throttling, retries and persistence live in the shared runner.
pub trait SourceScraper: Send + Sync {
    fn source(&self) -> &'static str;
    fn listing_type(&self) -> ListingType;
    fn property_type(&self) -> PropertyType;
    fn page_url(&self, page: u32) -> String;
    fn parse_list(&self, html: &str) -> Result<ParsedPage>;
    fn parse_detail(&self, html: &str, url: &str) -> Result<RawListingData>;
}

/// Cooperative cancellation shared between the worker and a running scrape.
/// Checked before each page and before each detail fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Extract a stable per-source listing id from an advertisement URL:
/// the `oglas-<digits>`/`oglas/<digits>` segment, else the trailing digit
/// run of the last path segment, else a 32-bit hash of the URL.
pub fn extract_external_id(url: &str) -> String {
    if let Some(pos) = url.find("oglas") {
        let rest = &url[pos + "oglas".len()..];
        let mut chars = rest.chars();
        if matches!(chars.next(), Some('/' | '-')) {
            let digits: String = chars
                .as_str()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if !digits.is_empty() {
                return digits;
            }
        }
    }

    let trimmed = url.trim_end_matches('/');
    if let Some(segment) = trimmed.rsplit('/').next() {
        let segment = segment.split('?').next().unwrap_or(segment);
        let tail_digits: Vec<char> = segment
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect();
        if !tail_digits.is_empty() {
            return tail_digits.into_iter().rev().collect();
        }
    }

    format!("u{:08x}", fnv1a_32(url.as_bytes()))
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::listing::{
    ListingType, PaginationInfo, ParsedPage, PropertyType, RawListingData,
};
use crate::error::{Error, Result};
use crate::scrape::{SourceScraper, extract_external_id};

pub const DEFAULT_BASE_URL: &str = "https://www.oglasnik.hr";

/// Oglasnik.hr section scraper.
pub struct OglasnikScraper {
    base_url: String,
    listing_type: ListingType,
    property_type: PropertyType,
}

impl OglasnikScraper {
    pub fn new(base_url: &str, listing_type: ListingType, property_type: PropertyType) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            listing_type,
            property_type,
        }
    }

    fn category_segment(&self) -> String {
        let deal = match self.listing_type {
            ListingType::Rent => "iznajmljivanje",
            ListingType::Sale => "prodaja",
        };
        let kind = match self.property_type {
            PropertyType::Apartment => "stanovi",
            PropertyType::House => "kuce",
            PropertyType::Office => "poslovni-prostori",
            PropertyType::Land => "zemljista",
            PropertyType::Other => "ostalo",
        };
        format!("nekretnine/{deal}/{kind}")
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            return href.to_string();
        }
        Url::parse(&self.base_url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{href}", self.base_url))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Selector {
        reason: format!("invalid selector '{css}': {e}"),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl SourceScraper for OglasnikScraper {
    fn source(&self) -> &'static str {
        "oglasnik"
    }

    fn listing_type(&self) -> ListingType {
        self.listing_type
    }

    fn property_type(&self) -> PropertyType {
        self.property_type
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/{}?page={page}", self.base_url, self.category_segment())
    }

    fn parse_list(&self, html: &str) -> Result<ParsedPage> {
        let document = Html::parse_document(html);
        let item_sel = selector("div.classified-item")?;
        let title_sel = selector("a.classified-title")?;
        let price_sel = selector("span.classified-price")?;
        let location_sel = selector("span.classified-location")?;
        let image_sel = selector("img.classified-image")?;

        let mut listings = Vec::new();
        for item in document.select(&item_sel) {
            let Some(link) = item.select(&title_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let url = self.absolute_url(href);

            listings.push(RawListingData {
                external_id: extract_external_id(&url),
                url,
                title: text_of(link),
                description: String::new(),
                price_text: item
                    .select(&price_sel)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
                location_text: item
                    .select(&location_sel)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
                rooms: None,
                surface_area_m2: None,
                images: item
                    .select(&image_sel)
                    .filter_map(|img| img.value().attr("src"))
                    .map(|src| self.absolute_url(src))
                    .collect(),
                raw_amenities: Vec::new(),
                property_info: Default::default(),
            });
        }

        let next_sel = selector("a[rel='next']")?;
        let next = document.select(&next_sel).next();
        let pagination = PaginationInfo {
            current_page: 1,
            total_pages: None,
            has_next: next.is_some(),
            next_url: next
                .and_then(|a| a.value().attr("href"))
                .map(|href| self.absolute_url(href)),
        };

        Ok(ParsedPage {
            listings,
            pagination,
        })
    }

    fn parse_detail(&self, html: &str, url: &str) -> Result<RawListingData> {
        let document = Html::parse_document(html);
        let title_sel = selector("h1.ad-title")?;
        let price_sel = selector("div.ad-price")?;
        let location_sel = selector("div.ad-location")?;
        let description_sel = selector("div.ad-description")?;
        let term_sel = selector("dl.ad-details dt")?;
        let definition_sel = selector("dl.ad-details dd")?;
        let amenity_sel = selector("ul.ad-features li")?;
        let image_sel = selector("div.ad-gallery img")?;

        let title = document
            .select(&title_sel)
            .next()
            .map(text_of)
            .ok_or_else(|| Error::Parse {
                reason: format!("detail page missing title: {url}"),
            })?;

        // dt/dd pairs align by position
        let mut property_info = std::collections::BTreeMap::new();
        let terms: Vec<String> = document.select(&term_sel).map(text_of).collect();
        let definitions: Vec<String> = document.select(&definition_sel).map(text_of).collect();
        for (label, value) in terms.into_iter().zip(definitions) {
            property_info.insert(label, value);
        }

        Ok(RawListingData {
            external_id: extract_external_id(url),
            url: url.to_string(),
            title,
            description: document
                .select(&description_sel)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            price_text: document
                .select(&price_sel)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            location_text: document
                .select(&location_sel)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            rooms: None,
            surface_area_m2: None,
            images: document
                .select(&image_sel)
                .filter_map(|img| img.value().attr("src"))
                .map(|src| self.absolute_url(src))
                .collect(),
            raw_amenities: document.select(&amenity_sel).map(text_of).collect(),
            property_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> OglasnikScraper {
        OglasnikScraper::new(DEFAULT_BASE_URL, ListingType::Sale, PropertyType::Apartment)
    }

    #[test]
    fn page_url_scheme() {
        assert_eq!(
            scraper().page_url(4),
            "https://www.oglasnik.hr/nekretnine/prodaja/stanovi?page=4"
        );
    }

    #[test]
    fn parse_list_and_next_link() {
        let html = r#"
        <html><body>
          <div class="classified-item">
            <a class="classified-title" href="/oglas/112233">Trosoban stan, Split</a>
            <span class="classified-price">185.000 €</span>
            <span class="classified-location">Split, Žnjan</span>
          </div>
          <a rel="next" href="/nekretnine/prodaja/stanovi?page=2">»</a>
        </body></html>"#;
        let page = scraper().parse_list(html).unwrap();
        assert_eq!(page.listings.len(), 1);
        assert_eq!(page.listings[0].external_id, "112233");
        assert!(page.pagination.has_next);
    }

    #[test]
    fn parse_detail_aligns_dt_dd() {
        let html = r#"
        <html><body>
          <h1 class="ad-title">Trosoban stan, Split</h1>
          <div class="ad-price">185.000 €</div>
          <div class="ad-location">Split, Žnjan</div>
          <div class="ad-description">Pogled na more, garaža u cijeni.</div>
          <dl class="ad-details">
            <dt>Broj soba</dt><dd>3</dd>
            <dt>Površina</dt><dd>88 m²</dd>
          </dl>
          <ul class="ad-features"><li>Garaža</li><li>Pogled na more</li></ul>
        </body></html>"#;
        let detail = scraper()
            .parse_detail(html, "https://www.oglasnik.hr/oglas/112233")
            .unwrap();
        assert_eq!(detail.property_info.get("Broj soba").map(String::as_str), Some("3"));
        assert_eq!(detail.property_info.get("Površina").map(String::as_str), Some("88 m²"));
        assert_eq!(detail.raw_amenities.len(), 2);
    }
}

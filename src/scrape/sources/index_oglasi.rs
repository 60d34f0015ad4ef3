use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::listing::{
    ListingType, PaginationInfo, ParsedPage, PropertyType, RawListingData,
};
use crate::error::{Error, Result};
use crate::scrape::{SourceScraper, extract_external_id};

pub const DEFAULT_BASE_URL: &str = "https://www.index.hr/oglasi";

/// Index Oglasi section scraper. List pages carry a short description
/// snippet, so detail fetches are rarely needed.
pub struct IndexOglasiScraper {
    base_url: String,
    listing_type: ListingType,
    property_type: PropertyType,
}

impl IndexOglasiScraper {
    pub fn new(base_url: &str, listing_type: ListingType, property_type: PropertyType) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            listing_type,
            property_type,
        }
    }

    fn category_segment(&self) -> String {
        let kind = match self.property_type {
            PropertyType::Apartment => "stanovi",
            PropertyType::House => "kuce",
            PropertyType::Office => "poslovni-prostori",
            PropertyType::Land => "zemljista",
            PropertyType::Other => "nekretnine",
        };
        let deal = match self.listing_type {
            ListingType::Rent => "najam",
            ListingType::Sale => "prodaja",
        };
        format!("{kind}/{deal}")
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

impl SourceScraper for IndexOglasiScraper {
    fn source(&self) -> &'static str {
        "index-oglasi"
    }

    fn listing_type(&self) -> ListingType {
        self.listing_type
    }

    fn property_type(&self) -> PropertyType {
        self.property_type
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/{}?stranica={page}",
            self.base_url,
            self.category_segment()
        )
    }

    fn parse_list(&self, html: &str) -> Result<ParsedPage> {
        let document = Html::parse_document(html);
        let item_sel = selector("article.oglas-item")?;
        let title_sel = selector("a.oglas-naslov")?;
        let price_sel = selector("span.oglas-cijena")?;
        let location_sel = selector("span.oglas-lokacija")?;
        let snippet_sel = selector("p.oglas-opis")?;
        let surface_sel = selector("span.oglas-kvadratura")?;
        let image_sel = selector("img.oglas-slika")?;

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
                description: item
                    .select(&snippet_sel)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
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
                surface_area_m2: item
                    .select(&surface_sel)
                    .next()
                    .and_then(|e| parse_m2(&text_of(e))),
                images: item
                    .select(&image_sel)
                    .filter_map(|img| img.value().attr("src"))
                    .map(|src| self.absolute_url(src))
                    .collect(),
                raw_amenities: Vec::new(),
                property_info: Default::default(),
            });
        }

        let next_sel = selector("a.pagination-sljedeca")?;
        let active_sel = selector("span.pagination-aktivna")?;
        let next = document.select(&next_sel).next();
        let pagination = PaginationInfo {
            current_page: document
                .select(&active_sel)
                .next()
                .and_then(|e| text_of(e).parse().ok())
                .unwrap_or(1),
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
        let title_sel = selector("h1.oglas-naslov")?;
        let price_sel = selector("div.oglas-cijena")?;
        let location_sel = selector("div.oglas-lokacija")?;
        let description_sel = selector("div.oglas-opis")?;
        let row_sel = selector("table.oglas-detalji tr")?;
        let cell_sel = selector("td")?;
        let amenity_sel = selector("ul.oglas-pogodnosti li")?;
        let image_sel = selector("div.oglas-galerija img")?;

        let title = document
            .select(&title_sel)
            .next()
            .map(text_of)
            .ok_or_else(|| Error::Parse {
                reason: format!("detail page missing title: {url}"),
            })?;

        let mut property_info = std::collections::BTreeMap::new();
        for row in document.select(&row_sel) {
            let mut cells = row.select(&cell_sel);
            if let (Some(label), Some(value)) = (cells.next(), cells.next()) {
                property_info.insert(text_of(label), text_of(value));
            }
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

fn parse_m2(text: &str) -> Option<f64> {
    let token: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    token.trim_end_matches('.').parse().ok()
}

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::listing::{
    ListingType, PaginationInfo, ParsedPage, PropertyType, RawListingData,
};
use crate::error::{Error, Result};
use crate::scrape::{SourceScraper, extract_external_id};

pub const DEFAULT_BASE_URL: &str = "https://www.njuskalo.hr";

/// Njuškalo section scraper. One instance per (listing type, property type)
/// category.
pub struct NjuskaloScraper {
    base_url: String,
    listing_type: ListingType,
    property_type: PropertyType,
}

impl NjuskaloScraper {
    pub fn new(base_url: &str, listing_type: ListingType, property_type: PropertyType) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            listing_type,
            property_type,
        }
    }

    fn category_segment(&self) -> &'static str {
        match (self.listing_type, self.property_type) {
            (ListingType::Rent, PropertyType::Apartment) => "iznajmljivanje-stanova",
            (ListingType::Rent, PropertyType::House) => "iznajmljivanje-kuca",
            (ListingType::Rent, PropertyType::Office) => "iznajmljivanje-poslovnih-prostora",
            (ListingType::Rent, _) => "iznajmljivanje-nekretnina",
            (ListingType::Sale, PropertyType::Apartment) => "prodaja-stanova",
            (ListingType::Sale, PropertyType::House) => "prodaja-kuca",
            (ListingType::Sale, PropertyType::Office) => "prodaja-poslovnih-prostora",
            (ListingType::Sale, PropertyType::Land) => "prodaja-zemljista",
            (ListingType::Sale, _) => "prodaja-nekretnina",
        }
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

impl SourceScraper for NjuskaloScraper {
    fn source(&self) -> &'static str {
        "njuskalo"
    }

    fn listing_type(&self) -> ListingType {
        self.listing_type
    }

    fn property_type(&self) -> PropertyType {
        self.property_type
    }

    fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            format!("{}/{}", self.base_url, self.category_segment())
        } else {
            format!("{}/{}?page={page}", self.base_url, self.category_segment())
        }
    }

    fn parse_list(&self, html: &str) -> Result<ParsedPage> {
        let document = Html::parse_document(html);
        let item_sel = selector("li.EntityList-item article.entity-body")?;
        let title_sel = selector("h3.entity-title a.link")?;
        let price_sel = selector(".entity-prices .price")?;
        let location_sel = selector(".entity-description-main")?;
        let image_sel = selector("img.entity-thumbnail-img")?;

        let mut listings = Vec::new();
        for item in document.select(&item_sel) {
            let Some(link) = item.select(&title_sel).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let url = self.absolute_url(href);

            let price_text = item
                .select(&price_sel)
                .next()
                .map(text_of)
                .unwrap_or_default();
            let location_text = item
                .select(&location_sel)
                .next()
                .map(text_of)
                .unwrap_or_default();
            let images = item
                .select(&image_sel)
                .filter_map(|img| {
                    img.value()
                        .attr("data-src")
                        .or_else(|| img.value().attr("src"))
                })
                .map(|src| self.absolute_url(src))
                .collect();

            listings.push(RawListingData {
                external_id: extract_external_id(&url),
                url,
                title: text_of(link),
                description: String::new(),
                price_text,
                location_text,
                rooms: None,
                surface_area_m2: None,
                images,
                raw_amenities: Vec::new(),
                property_info: Default::default(),
            });
        }

        let current_sel = selector(".Pagination-item--active")?;
        let next_sel = selector("a.Pagination-link--next")?;
        let current_page = document
            .select(&current_sel)
            .next()
            .and_then(|e| text_of(e).parse().ok())
            .unwrap_or(1);
        let next = document.select(&next_sel).next();
        let pagination = PaginationInfo {
            current_page,
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
        let title_sel = selector("h1.ClassifiedDetailSummary-title")?;
        let price_sel = selector(".ClassifiedDetailSummary-priceDomestic")?;
        let description_sel = selector(".ClassifiedDetailDescription")?;
        let location_sel = selector(".ClassifiedDetailSummary-location")?;
        let row_sel = selector(".ClassifiedDetailBasicDetails-listItem")?;
        let label_sel = selector(".ClassifiedDetailBasicDetails-listTerm")?;
        let value_sel = selector(".ClassifiedDetailBasicDetails-listDefinition")?;
        let amenity_sel = selector(".ClassifiedDetailAmenities-item")?;
        let image_sel = selector(".ClassifiedDetailGallery img")?;

        let title = document
            .select(&title_sel)
            .next()
            .map(text_of)
            .ok_or_else(|| Error::Parse {
                reason: format!("detail page missing title: {url}"),
            })?;

        let mut property_info = std::collections::BTreeMap::new();
        for row in document.select(&row_sel) {
            let label = row.select(&label_sel).next().map(text_of);
            let value = row.select(&value_sel).next().map(text_of);
            if let (Some(label), Some(value)) = (label, value) {
                property_info.insert(label, value);
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
                .filter_map(|img| {
                    img.value()
                        .attr("data-src")
                        .or_else(|| img.value().attr("src"))
                })
                .map(|src| self.absolute_url(src))
                .collect(),
            raw_amenities: document.select(&amenity_sel).map(text_of).collect(),
            property_info,
        })
    }
}

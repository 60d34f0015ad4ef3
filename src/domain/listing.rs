use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rent => "rent",
            Self::Sale => "sale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rent" => Some(Self::Rent),
            "sale" => Some(Self::Sale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    House,
    Office,
    Land,
    Other,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::House => "house",
            Self::Office => "office",
            Self::Land => "land",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "apartment" => Some(Self::Apartment),
            "house" => Some(Self::House),
            "office" => Some(Self::Office),
            "land" => Some(Self::Land),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Croatian label used when composing listing text for embedding.
    pub fn croatian(self) -> &'static str {
        match self {
            Self::Apartment => "stan",
            Self::House => "kuća",
            Self::Office => "poslovni prostor",
            Self::Land => "zemljište",
            Self::Other => "nekretnina",
        }
    }
}

/// Named amenity booleans plus everything else keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amenities {
    pub has_parking: bool,
    pub has_balcony: bool,
    pub has_garage: bool,
    pub is_furnished: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, bool>,
}

impl Amenities {
    /// Canonical names of all present amenities, primaries first.
    pub fn present(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.has_parking {
            names.push("parking");
        }
        if self.has_balcony {
            names.push("balkon");
        }
        if self.has_garage {
            names.push("garaža");
        }
        if self.is_furnished {
            names.push("namješteno");
        }
        for (name, present) in &self.extra {
            if *present {
                names.push(name.as_str());
            }
        }
        names
    }
}

/// Canonical representation of one property advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Integer EUR. Monthly amount for rentals, total for sales.
    pub price: i64,
    pub currency: String,
    pub listing_type: ListingType,
    pub property_type: PropertyType,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rooms: Option<u32>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
    #[serde(default)]
    pub surface_area_m2: Option<f64>,
    #[serde(default)]
    pub amenities: Amenities,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.title, self.city)?;
        if !self.address.is_empty() {
            write!(f, ", {}", self.address)?;
        }
        write!(f, " ({}€", self.price)?;
        if self.listing_type == ListingType::Rent {
            write!(f, "/mj")?;
        }
        if let Some(rooms) = self.rooms {
            write!(f, ", {rooms} sobe")?;
        }
        if let Some(area) = self.surface_area_m2 {
            write!(f, ", {area:.0}m²")?;
        }
        write!(f, ")")
    }
}

/// What a per-site parser yields for one advertisement, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListingData {
    pub external_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_text: String,
    pub location_text: String,
    #[serde(default)]
    pub rooms: Option<f64>,
    #[serde(default)]
    pub surface_area_m2: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub raw_amenities: Vec<String>,
    /// Label → value pairs from the property-info table, matched against
    /// Croatian label patterns during normalization.
    #[serde(default)]
    pub property_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: Option<u32>,
    pub has_next: bool,
    #[serde(default)]
    pub next_url: Option<String>,
}

/// One parsed list page.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub listings: Vec<RawListingData>,
    pub pagination: PaginationInfo,
}

/// Outcome of scraping one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub source: String,
    pub listings_scraped: u64,
    pub listings_saved: u64,
    pub listings_duplicate: u64,
    pub pages_processed: u32,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl ScrapeResult {
    pub fn empty(source: &str) -> Self {
        Self {
            success: true,
            source: source.to_string(),
            listings_scraped: 0,
            listings_saved: 0,
            listings_duplicate: 0,
            pages_processed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

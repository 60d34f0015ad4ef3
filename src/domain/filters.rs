use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::listing::{ListingType, PropertyType};

/// Structured, all-optional query extracted from free text.
/// An absent field means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFilters {
    #[serde(default)]
    pub listing_type: Option<ListingType>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub price_min: Option<i64>,
    #[serde(default)]
    pub price_max: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub rooms_min: Option<u32>,
    #[serde(default)]
    pub rooms_max: Option<u32>,
    #[serde(default)]
    pub surface_area_min: Option<f64>,
    #[serde(default)]
    pub surface_area_max: Option<f64>,
    #[serde(default)]
    pub has_parking: Option<bool>,
    #[serde(default)]
    pub has_balcony: Option<bool>,
    #[serde(default)]
    pub has_garage: Option<bool>,
    #[serde(default)]
    pub is_furnished: Option<bool>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

impl ExtractedFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge a newer extraction into this one. Newer values override the
    /// same key; absent newer values preserve the accumulated ones.
    pub fn merge(&mut self, newer: &ExtractedFilters) {
        if newer.listing_type.is_some() {
            self.listing_type = newer.listing_type;
        }
        if newer.property_type.is_some() {
            self.property_type = newer.property_type;
        }
        if newer.price_min.is_some() {
            self.price_min = newer.price_min;
        }
        if newer.price_max.is_some() {
            self.price_max = newer.price_max;
        }
        if newer.location.is_some() {
            self.location = newer.location.clone();
        }
        if newer.rooms_min.is_some() {
            self.rooms_min = newer.rooms_min;
        }
        if newer.rooms_max.is_some() {
            self.rooms_max = newer.rooms_max;
        }
        if newer.surface_area_min.is_some() {
            self.surface_area_min = newer.surface_area_min;
        }
        if newer.surface_area_max.is_some() {
            self.surface_area_max = newer.surface_area_max;
        }
        if newer.has_parking.is_some() {
            self.has_parking = newer.has_parking;
        }
        if newer.has_balcony.is_some() {
            self.has_balcony = newer.has_balcony;
        }
        if newer.has_garage.is_some() {
            self.has_garage = newer.has_garage;
        }
        if newer.is_furnished.is_some() {
            self.is_furnished = newer.is_furnished;
        }
        for amenity in &newer.amenities {
            if !self.amenities.contains(amenity) {
                self.amenities.push(amenity.clone());
            }
        }
    }

    /// Names of the high-value fields that are set, used by the search gate
    /// and follow-up question heuristics.
    pub fn high_value_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.listing_type.is_some() {
            fields.push("listing_type");
        }
        if self.property_type.is_some() {
            fields.push("property_type");
        }
        if self.price_max.is_some() {
            fields.push("price_max");
        }
        if self.location.is_some() {
            fields.push("location");
        }
        if self.rooms_min.is_some() {
            fields.push("rooms_min");
        }
        if self.rooms_max.is_some() {
            fields.push("rooms_max");
        }
        fields
    }

    /// Stable serialization of the set fields, used in cache keys.
    pub fn cache_fragment(&self) -> String {
        // serde_json maps preserve struct field order; sort explicitly so the
        // fragment stays stable across refactors.
        let value = serde_json::to_value(self).unwrap_or_default();
        let mut pairs: Vec<(String, String)> = value
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| !v.is_null() && *v != &serde_json::json!([]))
                    .map(|(k, v)| (k.clone(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Names of all filter fields, in schema order. Used when an empty query
/// marks everything ambiguous.
pub const ALL_FILTER_FIELDS: &[&str] = &[
    "listing_type",
    "property_type",
    "price_min",
    "price_max",
    "location",
    "rooms_min",
    "rooms_max",
    "surface_area_min",
    "surface_area_max",
    "has_parking",
    "has_balcony",
    "has_garage",
    "is_furnished",
    "amenities",
];

/// Confidence report for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfidence {
    /// Overall confidence in [0, 1].
    pub overall: f64,
    /// Per-field confidence in [0, 1].
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    #[serde(default)]
    pub ambiguous_fields: Vec<String>,
}

impl ExtractionConfidence {
    pub fn empty_input() -> Self {
        Self {
            overall: 0.0,
            fields: BTreeMap::new(),
            ambiguous_fields: ALL_FILTER_FIELDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn clamp(&mut self) {
        self.overall = self.overall.clamp(0.0, 1.0);
        for value in self.fields.values_mut() {
            *value = value.clamp(0.0, 1.0);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub filters: ExtractedFilters,
    pub confidence: ExtractionConfidence,
    /// "hr", "en", or "mixed"
    pub language: String,
}

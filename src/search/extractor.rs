use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::filters::{
    ALL_FILTER_FIELDS, ExtractedFilters, ExtractionConfidence, ExtractionResult,
};
use crate::domain::listing::{ListingType, PropertyType};
use crate::error::{Error, ExtractionCode, Result};
use crate::normalize::location::canonical_city;
use crate::ports::llm::{JsonCompletionRequest, LanguageModel};

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 800;

/// System prompt: filter schema, Croatian/English vocabulary, three
/// worked examples. The model must answer with a single JSON object.
const SYSTEM_PROMPT: &str = r#"You extract structured real-estate search filters from Croatian or English queries about the Croatian market.

Respond with ONE JSON object and nothing else:
{
  "listing_type": "rent" | "sale" | null,
  "property_type": "apartment" | "house" | "office" | "land" | "other" | null,
  "price_min": integer | null,
  "price_max": integer | null,
  "location": string | null,
  "rooms_min": integer | null,
  "rooms_max": integer | null,
  "surface_area_min": number | null,
  "surface_area_max": number | null,
  "has_parking": boolean | null,
  "has_balcony": boolean | null,
  "has_garage": boolean | null,
  "is_furnished": boolean | null,
  "amenities": [string],
  "confidence": {
    "overall": number 0..1,
    "fields": { "<field>": number 0..1 },
    "ambiguous_fields": [string]
  }
}

Vocabulary:
- listing_type: najam / iznajmljivanje / za najam / renta / rent -> "rent"; prodaja / kupnja / kupiti / for sale / buy -> "sale"
- property_type: stan / apartman / garsonijera / apartment / flat -> "apartment"; kuća / vikendica / house -> "house"; poslovni prostor / ured / office -> "office"; zemljište / građevinsko zemljište / land / plot -> "land"
- prices: "do 700 eura" -> price_max 700; "od 500 do 700" -> price_min 500, price_max 700; amounts in kn or HRK divide by 7.5345 and round
- rooms: garsonijera -> rooms_min 1, rooms_max 1; jednosoban -> 1; dvosoban -> 2; trosoban -> 3; četverosoban -> 4; "najmanje 2 sobe" -> rooms_min 2
- amenities: parking / parkirno mjesto -> has_parking; balkon / lođa -> has_balcony; garaža -> has_garage; namješten / namješteno -> is_furnished true; everything else (lift, klima, bazen, vrt...) goes into "amenities"
- location: keep the place name as written; do not invent districts

Set a field only when the query states it. Set booleans only to true. List genuinely unclear fields in ambiguous_fields and lower their confidence.

Examples:

Query: "Tražim dvosobni stan za najam u Zagrebu do 700€ s parkingom"
{"listing_type":"rent","property_type":"apartment","price_min":null,"price_max":700,"location":"Zagrebu","rooms_min":2,"rooms_max":2,"surface_area_min":null,"surface_area_max":null,"has_parking":true,"has_balcony":null,"has_garage":null,"is_furnished":null,"amenities":[],"confidence":{"overall":0.92,"fields":{"listing_type":0.95,"property_type":0.95,"price_max":0.9,"location":0.95,"rooms_min":0.9,"rooms_max":0.9,"has_parking":0.9},"ambiguous_fields":[]}}

Query: "kupio bih kuću s vrtom u okolici Splita, do 250.000 eura"
{"listing_type":"sale","property_type":"house","price_min":null,"price_max":250000,"location":"Split","rooms_min":null,"rooms_max":null,"surface_area_min":null,"surface_area_max":null,"has_parking":null,"has_balcony":null,"has_garage":null,"is_furnished":null,"amenities":["vrt"],"confidence":{"overall":0.88,"fields":{"listing_type":0.9,"property_type":0.95,"price_max":0.85,"location":0.8},"ambiguous_fields":["location"]}}

Query: "nekretnina"
{"listing_type":null,"property_type":null,"price_min":null,"price_max":null,"location":null,"rooms_min":null,"rooms_max":null,"surface_area_min":null,"surface_area_max":null,"has_parking":null,"has_balcony":null,"has_garage":null,"is_furnished":null,"amenities":[],"confidence":{"overall":0.2,"fields":{},"ambiguous_fields":["listing_type","property_type","price_max","location"]}}"#;

const CROATIAN_KEYWORDS: &[&str] = &[
    "stan", "kuća", "kuca", "najam", "prodaja", "soba", "sobni", "sobe", "traž", "kupnja",
    "zagreb", "split", "eura", "kvadrata", "namješten", "parkingom", "garaža",
];

const ENGLISH_KEYWORDS: &[&str] = &[
    "apartment", "house", "rent", "sale", "buy", "room", "bedroom", "looking for", "under",
    "furnished", "parking space",
];

/// One LLM call plus a strict validation pass: enumerated values only,
/// positive numbers only, booleans only when explicitly true.
pub struct FilterExtractor {
    model: Arc<dyn LanguageModel>,
}

impl FilterExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn extract(&self, query: &str) -> Result<ExtractionResult> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            // No provider call for empty input
            return Ok(ExtractionResult {
                filters: ExtractedFilters::default(),
                confidence: ExtractionConfidence::empty_input(),
                language: "hr".into(),
            });
        }

        let language = detect_language(trimmed);

        let request = JsonCompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: trimmed.to_string(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let raw = self
            .model
            .complete_json(&request)
            .await
            .map_err(wrap_provider_error)?;

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                // Invalid model output degrades to "understood nothing"
                // instead of failing the turn.
                warn!(error = %e, "Provider returned non-JSON extraction output");
                return Ok(ExtractionResult {
                    filters: ExtractedFilters::default(),
                    confidence: ExtractionConfidence::empty_input(),
                    language,
                });
            }
        };

        let filters = validate_filters(&parsed);
        let confidence = validate_confidence(&parsed);
        debug!(?filters, overall = confidence.overall, "Filters extracted");

        Ok(ExtractionResult {
            filters,
            confidence,
            language,
        })
    }
}

fn wrap_provider_error(err: Error) -> Error {
    let (code, retryable, message) = match &err {
        Error::RateLimited { .. } => (ExtractionCode::RateLimited, true, err.to_string()),
        Error::Timeout { .. } => (ExtractionCode::Timeout, true, err.to_string()),
        Error::Json(_) => (ExtractionCode::InvalidResponse, false, err.to_string()),
        _ => (ExtractionCode::ApiError, false, err.to_string()),
    };
    Error::Extraction {
        code,
        retryable,
        message,
    }
}

fn positive_i64(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64).filter(|v| *v > 0)
}

fn positive_u32(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(Value::as_i64)
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
}

fn positive_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| *v > 0.0)
}

/// Booleans are constraints only when explicitly true.
fn true_only(value: Option<&Value>) -> Option<bool> {
    match value.and_then(Value::as_bool) {
        Some(true) => Some(true),
        _ => None,
    }
}

fn validate_filters(parsed: &Value) -> ExtractedFilters {
    let mut filters = ExtractedFilters {
        listing_type: parsed
            .get("listing_type")
            .and_then(Value::as_str)
            .and_then(ListingType::parse),
        property_type: parsed
            .get("property_type")
            .and_then(Value::as_str)
            .and_then(PropertyType::parse),
        price_min: positive_i64(parsed.get("price_min")),
        price_max: positive_i64(parsed.get("price_max")),
        location: parsed
            .get("location")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| canonical_city(s).unwrap_or_else(|| s.to_string())),
        rooms_min: positive_u32(parsed.get("rooms_min")),
        rooms_max: positive_u32(parsed.get("rooms_max")),
        surface_area_min: positive_f64(parsed.get("surface_area_min")),
        surface_area_max: positive_f64(parsed.get("surface_area_max")),
        has_parking: true_only(parsed.get("has_parking")),
        has_balcony: true_only(parsed.get("has_balcony")),
        has_garage: true_only(parsed.get("has_garage")),
        is_furnished: true_only(parsed.get("is_furnished")),
        amenities: Vec::new(),
    };

    if let Some(items) = parsed.get("amenities").and_then(Value::as_array) {
        for item in items {
            if let Some(name) = item.as_str() {
                let name = name.trim().to_lowercase();
                if !name.is_empty() && !filters.amenities.contains(&name) {
                    filters.amenities.push(name);
                }
            }
        }
    }

    filters
}

fn validate_confidence(parsed: &Value) -> ExtractionConfidence {
    let mut confidence = ExtractionConfidence::default();
    let Some(raw) = parsed.get("confidence") else {
        return confidence;
    };

    confidence.overall = raw.get("overall").and_then(Value::as_f64).unwrap_or(0.0);

    if let Some(fields) = raw.get("fields").and_then(Value::as_object) {
        for (name, value) in fields {
            if ALL_FILTER_FIELDS.contains(&name.as_str())
                && let Some(score) = value.as_f64()
            {
                confidence.fields.insert(name.clone(), score);
            }
        }
    }

    if let Some(items) = raw.get("ambiguous_fields").and_then(Value::as_array) {
        for item in items {
            if let Some(name) = item.as_str()
                && ALL_FILTER_FIELDS.contains(&name)
            {
                confidence.ambiguous_fields.push(name.to_string());
            }
        }
    }

    confidence.clamp();
    confidence
}

/// Keyword-count language detection: "hr", "en", or "mixed".
pub fn detect_language(query: &str) -> String {
    let lower = query.to_lowercase();
    let hr = CROATIAN_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    let en = ENGLISH_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    match (hr > 0, en > 0) {
        (true, true) => "mixed".into(),
        (false, true) => "en".into(),
        _ => "hr".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::llm::Embedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedModel {
        response: std::sync::Mutex<Option<Result<String>>>,
        calls: AtomicU32,
    }

    impl ScriptedModel {
        fn returning(json: &str) -> Self {
            Self {
                response: std::sync::Mutex::new(Some(Ok(json.to_string()))),
                calls: AtomicU32::new(0),
            }
        }

        fn failing(err: Error) -> Self {
            Self {
                response: std::sync::Mutex::new(Some(Err(err))),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            unimplemented!("not used")
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            unimplemented!("not used")
        }

        async fn complete_json(&self, _request: &JsonCompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap()
                .take()
                .expect("model called more than once")
        }
    }

    const HAPPY_PATH_JSON: &str = r#"{
        "listing_type": "rent",
        "property_type": "apartment",
        "price_max": 700,
        "location": "Zagrebu",
        "rooms_min": 2,
        "rooms_max": 2,
        "has_parking": true,
        "amenities": [],
        "confidence": {
            "overall": 0.92,
            "fields": {"listing_type": 0.95, "price_max": 0.9},
            "ambiguous_fields": []
        }
    }"#;

    #[tokio::test]
    async fn happy_path_extraction() {
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::returning(HAPPY_PATH_JSON)));
        let result = extractor
            .extract("Tražim dvosobni stan za najam u Zagrebu do 700€ s parkingom")
            .await
            .unwrap();

        assert_eq!(result.filters.listing_type, Some(ListingType::Rent));
        assert_eq!(result.filters.property_type, Some(PropertyType::Apartment));
        assert_eq!(result.filters.price_max, Some(700));
        assert_eq!(result.filters.rooms_min, Some(2));
        assert_eq!(result.filters.rooms_max, Some(2));
        assert_eq!(result.filters.has_parking, Some(true));
        // Declined form canonicalized through the city table
        assert_eq!(result.filters.location.as_deref(), Some("Zagreb"));
        assert!(result.confidence.overall >= 0.85);
        assert_eq!(result.language, "hr");
    }

    #[tokio::test]
    async fn empty_query_skips_provider() {
        let model = Arc::new(ScriptedModel::returning("{}"));
        let extractor = FilterExtractor::new(Arc::clone(&model) as Arc<dyn LanguageModel>);
        let result = extractor.extract("   ").await.unwrap();

        assert!(result.filters.is_empty());
        assert!((result.confidence.overall - 0.0).abs() < f64::EPSILON);
        assert_eq!(
            result.confidence.ambiguous_fields.len(),
            ALL_FILTER_FIELDS.len()
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_json_degrades_to_empty_filters() {
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::returning(
            "I could not find any filters, sorry!",
        )));
        let result = extractor.extract("stan u Zagrebu").await.unwrap();
        assert!(result.filters.is_empty());
        assert!((result.confidence.overall - 0.0).abs() < f64::EPSILON);
        assert!(!result.confidence.ambiguous_fields.is_empty());
    }

    #[tokio::test]
    async fn validation_drops_unknown_enums_and_negatives() {
        let json = r#"{
            "listing_type": "timeshare",
            "property_type": "castle",
            "price_max": -50,
            "rooms_min": 0,
            "has_parking": false,
            "is_furnished": true,
            "confidence": {"overall": 1.8, "fields": {"price_max": -0.5}, "ambiguous_fields": []}
        }"#;
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::returning(json)));
        let result = extractor.extract("nešto").await.unwrap();

        assert_eq!(result.filters.listing_type, None);
        assert_eq!(result.filters.property_type, None);
        assert_eq!(result.filters.price_max, None);
        assert_eq!(result.filters.rooms_min, None);
        // false booleans are not constraints
        assert_eq!(result.filters.has_parking, None);
        assert_eq!(result.filters.is_furnished, Some(true));
        // clamped
        assert!((result.confidence.overall - 1.0).abs() < f64::EPSILON);
        assert!((result.confidence.fields["price_max"] - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn amenities_lowercased_and_deduplicated() {
        let json = r#"{
            "amenities": ["Lift", "lift", " Klima "],
            "confidence": {"overall": 0.7, "fields": {}, "ambiguous_fields": []}
        }"#;
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::returning(json)));
        let result = extractor.extract("stan s liftom i klimom").await.unwrap();
        assert_eq!(result.filters.amenities, vec!["lift", "klima"]);
    }

    #[tokio::test]
    async fn rate_limit_maps_to_retryable_extraction_error() {
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::failing(
            Error::RateLimited {
                retry_after_secs: Some(5),
            },
        )));
        let err = extractor.extract("stan").await.unwrap_err();
        match err {
            Error::Extraction {
                code, retryable, ..
            } => {
                assert_eq!(code, ExtractionCode::RateLimited);
                assert!(retryable);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn timeout_maps_to_retryable_extraction_error() {
        let extractor = FilterExtractor::new(Arc::new(ScriptedModel::failing(Error::Timeout {
            reason: "provider slow".into(),
        })));
        let err = extractor.extract("stan").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction {
                code: ExtractionCode::Timeout,
                retryable: true,
                ..
            }
        ));
    }

    #[test]
    fn language_detection() {
        assert_eq!(detect_language("Tražim stan za najam u Zagrebu"), "hr");
        assert_eq!(detect_language("Looking for an apartment to rent"), "en");
        assert_eq!(detect_language("apartment za najam"), "mixed");
        assert_eq!(detect_language("xyzzy"), "hr");
    }
}

use crate::domain::listing::Amenities;

/// Which named boolean an amenity pattern feeds, if any.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Primary {
    Parking,
    Balcony,
    Garage,
    Furnished,
}

/// Croatian/English amenity patterns → canonical key. Matching is
/// substring-based over the lowercased token.
const AMENITY_TABLE: &[(&str, &str, Option<Primary>)] = &[
    ("parking", "parking", Some(Primary::Parking)),
    ("parkirno", "parking", Some(Primary::Parking)),
    ("parkiralište", "parking", Some(Primary::Parking)),
    ("parkiraliste", "parking", Some(Primary::Parking)),
    ("balkon", "balkon", Some(Primary::Balcony)),
    ("lođa", "balkon", Some(Primary::Balcony)),
    ("lodza", "balkon", Some(Primary::Balcony)),
    ("loggia", "balkon", Some(Primary::Balcony)),
    ("garaž", "garaža", Some(Primary::Garage)),
    ("garaz", "garaža", Some(Primary::Garage)),
    ("garage", "garaža", Some(Primary::Garage)),
    ("namješten", "namješteno", Some(Primary::Furnished)),
    ("namjesten", "namješteno", Some(Primary::Furnished)),
    ("furnished", "namješteno", Some(Primary::Furnished)),
    ("opremljen", "namješteno", Some(Primary::Furnished)),
    // Everything below lands in the additional map.
    ("lift", "lift", None),
    ("dizalo", "lift", None),
    ("elevator", "lift", None),
    ("klima", "klima", None),
    ("air condition", "klima", None),
    ("terasa", "terasa", None),
    ("terrace", "terasa", None),
    ("vrt", "vrt", None),
    ("garden", "vrt", None),
    ("bazen", "bazen", None),
    ("pool", "bazen", None),
    ("podrum", "podrum", None),
    ("ostava", "ostava", None),
    ("pogled na more", "pogled na more", None),
    ("sea view", "pogled na more", None),
    ("novogradnja", "novogradnja", None),
    ("grijanje", "grijanje", None),
    ("heating", "grijanje", None),
    ("internet", "internet", None),
    ("kućni ljubimci", "kućni ljubimci", None),
    ("kucni ljubimci", "kućni ljubimci", None),
    ("pets", "kućni ljubimci", None),
    ("alarm", "alarm", None),
    ("video nadzor", "video nadzor", None),
    ("roštilj", "roštilj", None),
    ("rostilj", "roštilj", None),
];

/// Explicit "unfurnished" markers win over any furnished pattern; the token
/// is consumed without further matching ("nenamješteno" contains
/// "namješten").
const UNFURNISHED_MARKERS: &[&str] = &["nenamješteno", "nenamjesteno", "bez namještaja", "bez namjestaja", "prazan", "unfurnished"];

/// Map raw amenity tokens, and optionally a description blob, into the
/// canonical amenity set. Primaries OR together; additional keys union.
pub fn map_amenities(tokens: &[String], description: Option<&str>) -> Amenities {
    let mut amenities = Amenities::default();
    let mut explicitly_unfurnished = false;

    for token in tokens {
        apply_text(&token.to_lowercase(), &mut amenities, &mut explicitly_unfurnished);
    }

    if let Some(text) = description {
        apply_text(&text.to_lowercase(), &mut amenities, &mut explicitly_unfurnished);
    }

    if explicitly_unfurnished {
        amenities.is_furnished = false;
    }
    amenities
}

fn apply_text(lower: &str, amenities: &mut Amenities, explicitly_unfurnished: &mut bool) {
    if UNFURNISHED_MARKERS.iter().any(|m| lower.contains(m)) {
        *explicitly_unfurnished = true;
        amenities.is_furnished = false;
        // The remaining patterns still apply to descriptions that mention
        // other amenities alongside the unfurnished marker, but the
        // furnished pattern must not re-fire.
        for (pattern, canonical, primary) in AMENITY_TABLE {
            if *primary == Some(Primary::Furnished) {
                continue;
            }
            if lower.contains(pattern) {
                set_amenity(amenities, canonical, *primary);
            }
        }
        return;
    }

    for (pattern, canonical, primary) in AMENITY_TABLE {
        if lower.contains(pattern) {
            set_amenity(amenities, canonical, *primary);
        }
    }
}

fn set_amenity(amenities: &mut Amenities, canonical: &str, primary: Option<Primary>) {
    match primary {
        Some(Primary::Parking) => amenities.has_parking = true,
        Some(Primary::Balcony) => amenities.has_balcony = true,
        Some(Primary::Garage) => amenities.has_garage = true,
        Some(Primary::Furnished) => amenities.is_furnished = true,
        None => {
            amenities.extra.insert(canonical.to_string(), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn primary_amenities_set_booleans() {
        let result = map_amenities(&tokens(&["Parking", "Balkon", "Garaža"]), None);
        assert!(result.has_parking);
        assert!(result.has_balcony);
        assert!(result.has_garage);
        assert!(!result.is_furnished);
        assert!(result.extra.is_empty());
    }

    #[test]
    fn furnished_marker_sets_boolean() {
        let result = map_amenities(&tokens(&["Namješteno"]), None);
        assert!(result.is_furnished);
    }

    #[test]
    fn substring_matching() {
        // "parkirno mjesto u garaži" hits both parking and garage patterns
        let result = map_amenities(&tokens(&["parkirno mjesto u garaži"]), None);
        assert!(result.has_parking);
        assert!(result.has_garage);
    }

    #[test]
    fn unfurnished_marker_short_circuits() {
        // "nenamješteno" contains "namješten" as a substring; the explicit
        // marker must win
        let result = map_amenities(&tokens(&["nenamješteno"]), None);
        assert!(!result.is_furnished);
    }

    #[test]
    fn unfurnished_sticks_against_later_tokens() {
        let result = map_amenities(&tokens(&["bez namještaja", "namješteno"]), None);
        assert!(!result.is_furnished);
    }

    #[test]
    fn unfurnished_in_description_overrides_tokens() {
        let result = map_amenities(&tokens(&["namješteno"]), Some("Stan se predaje prazan."));
        assert!(!result.is_furnished);
    }

    #[test]
    fn secondary_amenities_land_in_extra() {
        let result = map_amenities(&tokens(&["Lift", "Klima uređaj", "Bazen"]), None);
        assert_eq!(result.extra.get("lift"), Some(&true));
        assert_eq!(result.extra.get("klima"), Some(&true));
        assert_eq!(result.extra.get("bazen"), Some(&true));
    }

    #[test]
    fn english_aliases_resolve() {
        let result = map_amenities(&tokens(&["furnished", "sea view", "elevator"]), None);
        assert!(result.is_furnished);
        assert_eq!(result.extra.get("pogled na more"), Some(&true));
        assert_eq!(result.extra.get("lift"), Some(&true));
    }

    #[test]
    fn description_merges_with_or_semantics() {
        let result = map_amenities(
            &tokens(&["balkon"]),
            Some("Uz stan dolazi parking i klima."),
        );
        assert!(result.has_balcony);
        assert!(result.has_parking);
        assert_eq!(result.extra.get("klima"), Some(&true));
    }

    #[test]
    fn empty_input_yields_default() {
        let result = map_amenities(&[], None);
        assert_eq!(result, Amenities::default());
    }

    #[test]
    fn mapping_is_idempotent() {
        let first = map_amenities(&tokens(&["parking", "lift", "namješteno"]), None);
        let names: Vec<String> = first.present().iter().map(|s| (*s).to_string()).collect();
        let second = map_amenities(&names, None);
        assert_eq!(first, second);
    }
}

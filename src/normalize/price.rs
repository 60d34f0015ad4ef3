use serde::{Deserialize, Serialize};

use crate::domain::listing::ListingType;

/// Fixed HRK→EUR conversion. The kuna was retired at this rate; it is frozen
/// by law and intentionally not configurable.
pub const HRK_PER_EUR: f64 = 7.5345;

const MONTHLY_MARKERS: &[&str] = &["/mj", "mjesec", "mj.", "najam", "monthly"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    /// Integer EUR, rounded.
    pub price: i64,
    pub currency: String,
    pub is_monthly: bool,
}

/// Normalize a raw price string into integer EUR.
///
/// Separator disambiguation is positional: a comma after the last dot reads
/// as a European decimal comma; a dot followed by exactly three digits with
/// no later comma reads as a European thousands dot; anything else reads as
/// US formatting.
pub fn normalize_price(raw: &str, listing_type: ListingType) -> NormalizedPrice {
    let lower = raw.to_lowercase();

    let is_monthly = listing_type == ListingType::Rent
        && MONTHLY_MARKERS.iter().any(|m| lower.contains(m));

    let Some(token) = first_numeric_token(raw) else {
        return NormalizedPrice {
            price: 0,
            currency: "EUR".into(),
            is_monthly,
        };
    };

    let mut value = parse_numeric_token(&token);

    if lower.contains("kn") || lower.contains("hrk") {
        value /= HRK_PER_EUR;
    }

    NormalizedPrice {
        price: value.round() as i64,
        currency: "EUR".into(),
        is_monthly,
    }
}

/// First run of digits with embedded dots/commas. Trailing separators are
/// not part of the token ("1.500." yields "1.500").
fn first_numeric_token(raw: &str) -> Option<String> {
    let bytes: Vec<char> = raw.chars().collect();
    let start = bytes.iter().position(|c| c.is_ascii_digit())?;

    let mut token = String::new();
    for &c in &bytes[start..] {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            token.push(c);
        } else {
            break;
        }
    }
    while token.ends_with('.') || token.ends_with(',') {
        token.pop();
    }
    if token.is_empty() { None } else { Some(token) }
}

fn parse_numeric_token(token: &str) -> f64 {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let cleaned = match (last_dot, last_comma) {
        (None, None) => token.to_string(),
        (Some(dot), None) => {
            let after_dot = &token[dot + 1..];
            if after_dot.len() == 3 {
                // European thousands: "1.500", "1.500.000"
                token.replace('.', "")
            } else {
                // US decimal point
                token.to_string()
            }
        }
        (None, Some(comma)) => european_decimal_comma(token, comma),
        (Some(dot), Some(comma)) => {
            if comma > dot {
                // European: dots group thousands, comma is the decimal point
                let no_dots = token.replace('.', "");
                let comma = no_dots.rfind(',').unwrap_or(no_dots.len());
                european_decimal_comma(&no_dots, comma)
            } else {
                let after_dot = &token[dot + 1..];
                if after_dot.len() == 3 {
                    // European thousands with a stray comma group
                    token.replace(['.', ','], "")
                } else {
                    // US: commas group thousands, dot is the decimal point
                    token.replace(',', "")
                }
            }
        }
    };

    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Interpret the last comma as a decimal point, except when the token is a
/// run of three-digit comma groups ("1,500,000"), which is grouping.
fn european_decimal_comma(token: &str, last_comma: usize) -> String {
    let digits_after = token.len() - last_comma - 1;
    if digits_after == 3 && token.matches(',').count() > 1 {
        token.replace(',', "")
    } else {
        token
            .chars()
            .enumerate()
            .filter_map(|(i, c)| match c {
                ',' if i == last_comma => Some('.'),
                ',' => None,
                _ => Some(c),
            })
            .collect()
    }
}

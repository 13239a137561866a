// ⭐ Rating Parser - heterogeneous raw ratings → clamped, rounded list
//
// Accepts absent values, scalars, delimited strings ("4,5" / "4|5" / "4 5"),
// bracketed JSON-style lists and native lists. Every value lands in
// [MIN_RATING, MAX_RATING] with 2 decimal places.

use crate::error::UnsupportedRatings;
use serde_json::Value;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

/// Parse a raw rating value.
///
/// Bad tokens are skipped silently, and so is a bracketed string that is not
/// valid JSON (it yields an empty list). Booleans count as 1 and 0. Only an
/// object as the overall value returns an error.
pub fn parse_ratings(raw: Option<&Value>) -> Result<Vec<f64>, UnsupportedRatings> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => value,
    };

    match raw {
        Value::Number(_) | Value::Bool(_) => Ok(rating_from_value(raw).into_iter().collect()),
        Value::Array(items) => Ok(items.iter().filter_map(rating_from_value).collect()),
        Value::String(s) => Ok(parse_rating_str(s)),
        Value::Object(_) => Err(UnsupportedRatings("object")),
        Value::Null => Ok(Vec::new()),
    }
}

/// String form of a rating list.
pub fn parse_rating_str(raw: &str) -> Vec<f64> {
    let context = raw.trim();
    if context.is_empty() {
        return Vec::new();
    }

    if context.starts_with('[') && context.ends_with(']') {
        return match serde_json::from_str::<Value>(context) {
            Ok(Value::Array(items)) => items.iter().filter_map(rating_from_value).collect(),
            _ => Vec::new(),
        };
    }

    context
        .split(is_rating_separator)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .map(normalize_rating)
        .collect()
}

/// Clamp to the rating range, then round to 2 decimal places.
/// NaN lands on the lower bound.
pub fn normalize_rating(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_RATING;
    }
    round_to_hundredths(value.clamp(MIN_RATING, MAX_RATING))
}

/// Round on the exact decimal value of `value`, exact ties to even.
/// 0.125 becomes 0.12, while 1.115 (stored just below) becomes 1.11.
pub(crate) fn round_to_hundredths(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

fn rating_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    Some(normalize_rating(number))
}

fn is_rating_separator(c: char) -> bool {
    matches!(c, ',' | '|' | ';') || c.is_whitespace()
}

// ============================================================================
// TESTS
// ============================================================================

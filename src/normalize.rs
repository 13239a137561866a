// 🧹 Record Normalizer - RawRow → CanonicalRecord
// One field map per SourceKind, applied exactly once per row.
//
// A CanonicalRecord is either fully valid or normalization fails:
// reconciliation never sees a half-populated record.

use crate::error::NormalizationError;
use crate::parser::{RawRow, SourceKind};
use crate::ratings::parse_ratings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// Normalized, format-independent point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Business key, the upsert pivot (non-empty after trimming)
    pub external_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    /// Each value in [0.0, 5.0], 2 decimal places
    #[serde(default)]
    pub ratings: Vec<f64>,
    #[serde(default)]
    pub description: String,
}

// ============================================================================
// FIELD MAPS
// ============================================================================

/// Where a source keeps its coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFields {
    /// Two scalar fields
    Split {
        latitude: &'static str,
        longitude: &'static str,
    },
    /// One composite field: `[lat, lon, ...]` or `{"latitude": .., "longitude": ..}`
    Combined(&'static str),
}

/// Raw field names of one source format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub external_id: &'static str,
    pub name: &'static str,
    pub coordinates: CoordinateFields,
    pub category: &'static str,
    pub ratings: &'static str,
    pub description: &'static str,
}

pub const TABULAR_FIELDS: FieldMap = FieldMap {
    external_id: "poi_id",
    name: "poi_name",
    coordinates: CoordinateFields::Split {
        latitude: "poi_latitude",
        longitude: "poi_longitude",
    },
    category: "poi_category",
    ratings: "poi_ratings",
    description: "poi_description",
};

pub const STRUCTURED_FIELDS: FieldMap = FieldMap {
    external_id: "id",
    name: "name",
    coordinates: CoordinateFields::Combined("coordinates"),
    category: "category",
    ratings: "ratings",
    description: "description",
};

pub const MARKUP_FIELDS: FieldMap = FieldMap {
    external_id: "pid",
    name: "pname",
    coordinates: CoordinateFields::Split {
        latitude: "platitude",
        longitude: "plongitude",
    },
    category: "pcategory",
    ratings: "pratings",
    description: "pdescription",
};

impl FieldMap {
    pub fn for_source(source: SourceKind) -> &'static FieldMap {
        match source {
            SourceKind::Tabular => &TABULAR_FIELDS,
            SourceKind::Structured => &STRUCTURED_FIELDS,
            SourceKind::Markup => &MARKUP_FIELDS,
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Map one raw row from `source` into a CanonicalRecord.
pub fn normalize(row: &RawRow, source: SourceKind) -> Result<CanonicalRecord, NormalizationError> {
    let fields = FieldMap::for_source(source);

    let external_id = required_text(row, fields.external_id)?;
    if external_id.is_empty() {
        return Err(NormalizationError::EmptyField(fields.external_id));
    }
    let name = required_text(row, fields.name)?;

    let (latitude, longitude) = match fields.coordinates {
        CoordinateFields::Split { latitude, longitude } => (
            required_number(row, latitude)?,
            required_number(row, longitude)?,
        ),
        CoordinateFields::Combined(key) => combined_coordinates(row.get(key))?,
    };

    let category = required_text(row, fields.category)?;

    let ratings = parse_ratings(row.get(fields.ratings)).map_err(|source| {
        NormalizationError::Ratings {
            field: fields.ratings,
            source,
        }
    })?;

    let description = match row.get(fields.description) {
        None | Some(Value::Null) => String::new(),
        Some(value) => text_of(fields.description, value)?,
    };

    Ok(CanonicalRecord {
        external_id,
        name,
        latitude,
        longitude,
        category,
        ratings,
        description,
    })
}

/// Present, non-null field coerced to trimmed text
fn required_text(row: &RawRow, field: &'static str) -> Result<String, NormalizationError> {
    match row.get(field) {
        None | Some(Value::Null) => Err(NormalizationError::MissingField(field)),
        Some(value) => text_of(field, value),
    }
}

fn text_of(field: &'static str, value: &Value) -> Result<String, NormalizationError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(NormalizationError::InvalidType {
            field,
            kind: value_kind(other),
        }),
    }
}

fn required_number(row: &RawRow, field: &'static str) -> Result<f64, NormalizationError> {
    let value = match row.get(field) {
        None | Some(Value::Null) => return Err(NormalizationError::MissingField(field)),
        Some(value) => value,
    };

    number_of(value).ok_or_else(|| NormalizationError::InvalidNumber {
        field,
        value: match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

/// Finite number from a JSON number or numeric text
fn number_of(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Pair form first, then object form.
fn combined_coordinates(value: Option<&Value>) -> Result<(f64, f64), NormalizationError> {
    let value = value.ok_or(NormalizationError::InvalidCoordinates)?;

    coordinate_pair(value)
        .or_else(|| coordinate_object(value))
        .ok_or(NormalizationError::InvalidCoordinates)
}

fn coordinate_pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_array()?.as_slice() {
        [lat, lon, ..] => Some((number_of(lat)?, number_of(lon)?)),
        _ => None,
    }
}

fn coordinate_object(value: &Value) -> Option<(f64, f64)> {
    let object = value.as_object()?;
    Some((
        number_of(object.get("latitude")?)?,
        number_of(object.get("longitude")?)?,
    ))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TESTS
// ============================================================================

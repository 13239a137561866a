// Error taxonomy for the import pipeline
// RatingParser drops bad tokens, RecordNormalizer is strict, ImportService wraps
// everything per file into ImportServiceError.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// RATINGS
// ============================================================================

/// Raised only when the whole raw rating value has a shape the parser does not
/// understand (an object). Individual bad tokens are never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported rating value of type {0}")]
pub struct UnsupportedRatings(pub &'static str);

// ============================================================================
// NORMALIZATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("field '{field}' is not a valid number: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field '{field}' has unsupported value type {kind}")]
    InvalidType {
        field: &'static str,
        kind: &'static str,
    },

    #[error("missing or invalid coordinates")]
    InvalidCoordinates,

    #[error("field '{field}': {source}")]
    Ratings {
        field: &'static str,
        #[source]
        source: UnsupportedRatings,
    },
}

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

// ============================================================================
// PER-FILE IMPORT
// ============================================================================

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file not found: '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported file format '{extension}' (expected .csv, .json or .xml)")]
    UnsupportedFormat { extension: String },

    #[error("invalid data in record {row}: {source}")]
    Normalization {
        row: usize,
        #[source]
        source: NormalizationError,
    },

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed delimited data: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON on line {line}: {source}")]
    JsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed XML document: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected document structure: {0}")]
    UnexpectedStructure(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

/// Outward-facing failure of a run: the cause plus the file that produced it.
#[derive(Debug, Error)]
#[error("failed processing '{}': {source}", .path.display())]
pub struct ImportServiceError {
    pub path: PathBuf,
    #[source]
    pub source: ImportError,
}

impl ImportServiceError {
    pub fn new(path: impl Into<PathBuf>, source: ImportError) -> Self {
        ImportServiceError {
            path: path.into(),
            source,
        }
    }
}

// POI Import - Core Library
// Exposes the import pipeline for the CLI and tests

pub mod error;
pub mod ratings;
pub mod parser;
pub mod normalize;
pub mod store;
pub mod db;
pub mod upsert;
pub mod import;
pub mod admin;

// Re-export commonly used types
pub use error::{
    ImportError, ImportServiceError, NormalizationError, StoreError, UnsupportedRatings,
};
pub use ratings::{parse_ratings, parse_rating_str, MAX_RATING, MIN_RATING};
pub use parser::{
    detect_source, get_extractor,
    RawRow, RecordExtractor, RowGroups, SourceKind,
    CsvExtractor, JsonExtractor, XmlExtractor, LineProbe,
};
pub use normalize::{normalize, CanonicalRecord, FieldMap};
pub use store::{AuditEntry, AuditSink, PoiField, PoiStore, StoredPoi};
pub use db::{setup_database, SqliteStore};
pub use upsert::{batched, UpsertCounts, UpsertReconciler};
pub use import::{
    FileOutcome, ImportOptions, ImportReport, ImportService, ImportStats,
    DEFAULT_BATCH_SIZE, DEFAULT_GROUP_SIZE,
};
pub use admin::{AdminView, SearchTerm, IMPORT_HISTORY_ADMIN, POI_ADMIN};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

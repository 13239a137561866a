// Storage seams consumed by the importer
//
// PoiStore: lookup by external key, bulk create, bulk field-update, plus the
// begin/commit/rollback bracket that makes one reconciliation group atomic.
// AuditSink: one provenance entry per successfully imported file.

use crate::error::StoreError;
use crate::normalize::CanonicalRecord;
use crate::parser::SourceKind;
use crate::ratings::{normalize_rating, round_to_hundredths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// STORED ENTITIES
// ============================================================================

/// A point of interest as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoi {
    /// Store-assigned identity (UUID) - never changes
    pub id: String,
    /// Business key - never changes once stored
    pub external_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    pub ratings: Vec<f64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredPoi {
    /// Overwrite every mutable field from a freshly normalized record.
    /// `id` and `external_id` are left alone.
    pub fn apply(&mut self, record: &CanonicalRecord) {
        self.name = record.name.clone();
        self.latitude = record.latitude;
        self.longitude = record.longitude;
        self.category = record.category.clone();
        self.ratings = record.ratings.clone();
        self.description = record.description.clone();
    }

    /// Mean rating (each value clamped to the rating range), 2 decimal places.
    /// None when there is nothing to average.
    pub fn avg_rating(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .ratings
            .iter()
            .map(|r| normalize_rating(*r))
            .collect();
        if values.is_empty() {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(round_to_hundredths(mean))
    }
}

impl std::fmt::Display for StoredPoi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.external_id)
    }
}

/// Mutable columns a bulk update may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoiField {
    Name,
    Latitude,
    Longitude,
    Category,
    Ratings,
    Description,
}

impl PoiField {
    /// Every field an upsert overwrites
    pub const ALL: [PoiField; 6] = [
        PoiField::Name,
        PoiField::Latitude,
        PoiField::Longitude,
        PoiField::Category,
        PoiField::Ratings,
        PoiField::Description,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            PoiField::Name => "name",
            PoiField::Latitude => "latitude",
            PoiField::Longitude => "longitude",
            PoiField::Category => "category",
            PoiField::Ratings => "ratings",
            PoiField::Description => "description",
        }
    }
}

/// Provenance record: one per successfully processed file, write-once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub source: SourceKind,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(source: SourceKind, filename: &str) -> Self {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            filename: filename.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// INTERFACES
// ============================================================================

/// Record store keyed by external id
pub trait PoiStore {
    /// Existing entities for `external_ids`, keyed by external id.
    /// Keys without a stored entity are simply absent from the map.
    fn find_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<HashMap<String, StoredPoi>, StoreError>;

    /// Insert new entities, `batch_size` rows per write. Returns rows written.
    fn bulk_create(
        &self,
        records: &[CanonicalRecord],
        batch_size: usize,
    ) -> Result<usize, StoreError>;

    /// Write `fields` of existing entities, `batch_size` rows per write.
    /// Returns rows written.
    fn bulk_update(
        &self,
        entities: &[StoredPoi],
        fields: &[PoiField],
        batch_size: usize,
    ) -> Result<usize, StoreError>;

    /// Open an atomic unit of work
    fn begin(&self) -> Result<(), StoreError>;

    /// Make everything since begin() durable
    fn commit(&self) -> Result<(), StoreError>;

    /// Discard everything since begin()
    fn rollback(&self) -> Result<(), StoreError>;
}

/// Write-only provenance log
pub trait AuditSink {
    fn record(&self, source: SourceKind, filename: &str) -> Result<AuditEntry, StoreError>;
}

// ============================================================================
// TESTS
// ============================================================================

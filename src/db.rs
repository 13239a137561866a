// 🗄️ SQLite store - PoiStore + AuditSink over rusqlite
// WAL mode, UNIQUE(external_id), ratings kept as JSON text.

use crate::error::StoreError;
use crate::normalize::CanonicalRecord;
use crate::parser::SourceKind;
use crate::store::{AuditEntry, AuditSink, PoiField, PoiStore, StoredPoi};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Max keys bound into one `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

const POI_COLUMNS: &str = "id, external_id, name, latitude, longitude, category, ratings, \
                           description, created_at, updated_at";

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Points of interest
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS point_of_interest (
            id TEXT PRIMARY KEY NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            category TEXT NOT NULL,
            ratings TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CONSTRAINT unique_external_id UNIQUE (external_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Import history (one row per imported file)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS historical_import_data (
            id TEXT PRIMARY KEY NOT NULL,
            source TEXT NOT NULL,
            filename TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_poi_category ON point_of_interest(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_poi_name ON point_of_interest(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_source ON historical_import_data(source)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn get_poi(&self, external_id: &str) -> Result<Option<StoredPoi>, StoreError> {
        let sql = format!(
            "SELECT {} FROM point_of_interest WHERE external_id = ?1",
            POI_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, [external_id], RawPoiRow::from_row)
            .optional()?;
        raw.map(RawPoiRow::into_poi).transpose()
    }

    pub fn get_poi_by_id(&self, id: &str) -> Result<Option<StoredPoi>, StoreError> {
        let sql = format!("SELECT {} FROM point_of_interest WHERE id = ?1", POI_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, [id], RawPoiRow::from_row)
            .optional()?;
        raw.map(RawPoiRow::into_poi).transpose()
    }

    pub fn count_pois(&self) -> Result<i64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM point_of_interest", [], |row| row.get(0))?;
        Ok(count)
    }

    /// POIs matching a WHERE clause, ordered by creation
    pub fn query_pois(
        &self,
        where_clause: &str,
        args: &[SqlValue],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredPoi>, StoreError> {
        let sql = format!(
            "SELECT {} FROM point_of_interest WHERE {} \
             ORDER BY created_at, rowid LIMIT {} OFFSET {}",
            POI_COLUMNS, where_clause, limit, offset
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), RawPoiRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawPoiRow::into_poi).collect()
    }

    /// Import history, newest first, optionally for one source kind
    pub fn import_history(
        &self,
        source: Option<SourceKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, filename, timestamp
             FROM historical_import_data
             WHERE ?1 IS NULL OR source = ?1
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt
            .query_map(
                params![source.map(|s| s.code()), limit as i64, offset as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, source, filename, timestamp)| {
                let source = SourceKind::from_code(&source)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown source '{}'", source)))?;
                Ok(AuditEntry {
                    id,
                    source,
                    filename,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }
}

impl PoiStore for SqliteStore {
    fn find_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<HashMap<String, StoredPoi>, StoreError> {
        let mut found = HashMap::with_capacity(external_ids.len());

        for chunk in external_ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM point_of_interest WHERE external_id IN ({})",
                POI_COLUMNS, placeholders
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), RawPoiRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            for raw in rows {
                let poi = raw.into_poi()?;
                found.insert(poi.external_id.clone(), poi);
            }
        }

        Ok(found)
    }

    fn bulk_create(
        &self,
        records: &[CanonicalRecord],
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO point_of_interest (
                id, external_id, name, latitude, longitude, category,
                ratings, description, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        )?;

        let mut written = 0;
        for batch in records.chunks(batch_size.max(1)) {
            let now = format_timestamp(&Utc::now());
            for record in batch {
                written += stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    record.external_id,
                    record.name,
                    record.latitude,
                    record.longitude,
                    record.category,
                    serde_json::to_string(&record.ratings)?,
                    record.description,
                    now,
                ])?;
            }
            debug!(rows = batch.len(), "bulk create batch");
        }

        Ok(written)
    }

    fn bulk_update(
        &self,
        entities: &[StoredPoi],
        fields: &[PoiField],
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        if entities.is_empty() {
            return Ok(0);
        }

        // ?1.. for the fields, then updated_at, then id
        let mut assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{} = ?{}", f.column(), i + 1))
            .collect();
        assignments.push(format!("updated_at = ?{}", fields.len() + 1));
        let sql = format!(
            "UPDATE point_of_interest SET {} WHERE id = ?{}",
            assignments.join(", "),
            fields.len() + 2
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let mut written = 0;
        for batch in entities.chunks(batch_size.max(1)) {
            let now = format_timestamp(&Utc::now());
            for entity in batch {
                let mut values = Vec::with_capacity(fields.len() + 2);
                for field in fields {
                    values.push(field_value(entity, *field)?);
                }
                values.push(SqlValue::Text(now.clone()));
                values.push(SqlValue::Text(entity.id.clone()));
                written += stmt.execute(params_from_iter(values))?;
            }
            debug!(rows = batch.len(), "bulk update batch");
        }

        Ok(written)
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl AuditSink for SqliteStore {
    fn record(&self, source: SourceKind, filename: &str) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry::new(source, filename);

        self.conn.execute(
            "INSERT INTO historical_import_data (id, source, filename, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.id,
                entry.source.code(),
                entry.filename,
                format_timestamp(&entry.timestamp),
            ],
        )?;

        Ok(entry)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Column values as stored, before JSON/timestamp decoding
struct RawPoiRow {
    id: String,
    external_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    category: String,
    ratings: String,
    description: String,
    created_at: String,
    updated_at: String,
}

impl RawPoiRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawPoiRow {
            id: row.get(0)?,
            external_id: row.get(1)?,
            name: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            category: row.get(5)?,
            ratings: row.get(6)?,
            description: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_poi(self) -> Result<StoredPoi, StoreError> {
        Ok(StoredPoi {
            id: self.id,
            external_id: self.external_id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            category: self.category,
            ratings: serde_json::from_str(&self.ratings)?,
            description: self.description,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn field_value(entity: &StoredPoi, field: PoiField) -> Result<SqlValue, StoreError> {
    Ok(match field {
        PoiField::Name => SqlValue::Text(entity.name.clone()),
        PoiField::Latitude => SqlValue::Real(entity.latitude),
        PoiField::Longitude => SqlValue::Real(entity.longitude),
        PoiField::Category => SqlValue::Text(entity.category.clone()),
        PoiField::Ratings => SqlValue::Text(serde_json::to_string(&entity.ratings)?),
        PoiField::Description => SqlValue::Text(entity.description.clone()),
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(external_id: &str, name: &str) -> CanonicalRecord {
        CanonicalRecord {
            external_id: external_id.to_string(),
            name: name.to_string(),
            latitude: 48.008273899935716,
            longitude: 16.2454885,
            category: "convenience-store".to_string(),
            ratings: vec![2.0, 3.0, 4.5],
            description: "corner shop".to_string(),
        }
    }

    #[test]
    fn test_bulk_create_and_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();

        let written = store
            .bulk_create(&[record("E1", "One"), record("E2", "Two"), record("E3", "Three")], 2)
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(store.count_pois().unwrap(), 3);

        let found = store
            .find_by_external_ids(&["E1".to_string(), "E3".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["E3"].name, "Three");
        assert_eq!(found["E1"].ratings, vec![2.0, 3.0, 4.5]);
        assert!(uuid::Uuid::parse_str(&found["E1"].id).is_ok());

        let by_id = store.get_poi_by_id(&found["E1"].id).unwrap().unwrap();
        assert_eq!(by_id.external_id, "E1");
    }

    #[test]
    fn test_lookup_more_keys_than_one_chunk() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records: Vec<CanonicalRecord> = (0..LOOKUP_CHUNK + 10)
            .map(|i| record(&format!("K{}", i), "n"))
            .collect();
        store.bulk_create(&records, 100).unwrap();

        let keys: Vec<String> = records.iter().map(|r| r.external_id.clone()).collect();
        assert_eq!(store.find_by_external_ids(&keys).unwrap().len(), LOOKUP_CHUNK + 10);
    }

    #[test]
    fn test_unique_external_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_create(&[record("E1", "One")], 10).unwrap();
        assert!(store.bulk_create(&[record("E1", "Again")], 10).is_err());
    }

    #[test]
    fn test_bulk_update_selected_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_create(&[record("E1", "One")], 10).unwrap();

        let mut poi = store.get_poi("E1").unwrap().unwrap();
        poi.name = "Renamed".to_string();
        poi.category = "not-written".to_string();

        let written = store.bulk_update(&[poi.clone()], &[PoiField::Name], 10).unwrap();
        assert_eq!(written, 1);

        let reloaded = store.get_poi("E1").unwrap().unwrap();
        assert_eq!(reloaded.name, "Renamed");
        assert_eq!(reloaded.category, "convenience-store");
        assert_eq!(reloaded.id, poi.id);
        assert!(reloaded.updated_at >= reloaded.created_at);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.begin().unwrap();
        store.bulk_create(&[record("E1", "One")], 10).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.count_pois().unwrap(), 0);

        store.begin().unwrap();
        store.bulk_create(&[record("E2", "Two")], 10).unwrap();
        store.commit().unwrap();
        assert_eq!(store.count_pois().unwrap(), 1);
    }

    #[test]
    fn test_audit_entries() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.record(SourceKind::Tabular, "pois.csv").unwrap();
        store.record(SourceKind::Markup, "pois.xml").unwrap();

        let all = store.import_history(None, 50, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].filename, "pois.xml");

        let csv_only = store.import_history(Some(SourceKind::Tabular), 50, 0).unwrap();
        assert_eq!(csv_only.len(), 1);
        assert_eq!(csv_only[0].source, SourceKind::Tabular);
    }
}

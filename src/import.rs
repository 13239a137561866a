// 📥 Import Service - detect → extract → normalize → reconcile, file by file
//
// Files are processed sequentially in the order given. Within a file, each
// extraction group is normalized and reconciled before the next is read.

use crate::error::{ImportError, ImportServiceError};
use crate::normalize::{normalize, CanonicalRecord};
use crate::parser::{detect_source, get_extractor, SourceKind};
use crate::store::{AuditSink, PoiStore};
use crate::upsert::{UpsertCounts, UpsertReconciler};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, info_span, warn};

pub const DEFAULT_GROUP_SIZE: usize = 100_000;
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

// ============================================================================
// OPTIONS
// ============================================================================

/// Extraction group size and reconciliation batch size, configured separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    group_size: usize,
    batch_size: usize,
}

impl ImportOptions {
    pub fn new(group_size: usize, batch_size: usize) -> Result<Self, ImportError> {
        if group_size == 0 {
            return Err(ImportError::InvalidOption(
                "group size must be at least 1".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(ImportError::InvalidOption(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(ImportOptions {
            group_size,
            batch_size,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            group_size: DEFAULT_GROUP_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Run-wide counters; only ever increased
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub files_processed: usize,
    pub created: usize,
    pub updated: usize,
}

impl ImportStats {
    pub fn record_file(&mut self, outcome: &FileOutcome) {
        self.files_processed += 1;
        self.created += outcome.counts.created;
        self.updated += outcome.counts.updated;
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files processed: {} | created: {} | updated: {}",
            self.files_processed, self.created, self.updated
        )
    }
}

/// Result of one fully imported file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub source: SourceKind,
    pub filename: String,
    pub records: usize,
    pub counts: UpsertCounts,
}

/// Result of `run_each`: stats for the files that made it, plus every failure
#[derive(Debug, Default)]
pub struct ImportReport {
    pub stats: ImportStats,
    pub failures: Vec<ImportServiceError>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// IMPORT SERVICE
// ============================================================================

pub struct ImportService<'a, S: ?Sized, A: ?Sized> {
    store: &'a S,
    audit: &'a A,
    options: ImportOptions,
}

impl<'a, S, A> ImportService<'a, S, A>
where
    S: PoiStore + ?Sized,
    A: AuditSink + ?Sized,
{
    pub fn new(store: &'a S, audit: &'a A, options: ImportOptions) -> Self {
        ImportService {
            store,
            audit,
            options,
        }
    }

    /// Import every path in order. The first failing file aborts the run and
    /// the stats of files before it are not returned.
    pub fn run<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ImportStats, ImportServiceError> {
        let mut stats = ImportStats::default();

        for path in paths {
            let path = path.as_ref();
            let outcome = self
                .import_file(path)
                .map_err(|source| ImportServiceError::new(path, source))?;
            stats.record_file(&outcome);
        }

        info!(
            files = stats.files_processed,
            created = stats.created,
            updated = stats.updated,
            "import run complete"
        );
        Ok(stats)
    }

    /// Import every path in order, carrying on past failing files.
    pub fn run_each<P: AsRef<Path>>(&self, paths: &[P]) -> ImportReport {
        let mut report = ImportReport::default();

        for path in paths {
            let path = path.as_ref();
            match self.import_file(path) {
                Ok(outcome) => report.stats.record_file(&outcome),
                Err(source) => {
                    let err = ImportServiceError::new(path, source);
                    warn!(error = %err, "file skipped");
                    report.failures.push(err);
                }
            }
        }

        report
    }

    /// One file end to end, including its audit entry.
    pub fn import_file(&self, path: &Path) -> Result<FileOutcome, ImportError> {
        let span = info_span!("import_file", path = %path.display());
        let _enter = span.enter();

        if !path.exists() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }
        let source = detect_source(path)?;

        let (records, counts) = self.process_file(path, source)?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.audit.record(source, &filename)?;

        info!(
            source = %source,
            records,
            created = counts.created,
            updated = counts.updated,
            "file imported"
        );

        Ok(FileOutcome {
            source,
            filename,
            records,
            counts,
        })
    }

    /// Extract, normalize and reconcile group by group. The extractor (and its
    /// file handle) is dropped when this returns, on every path.
    fn process_file(
        &self,
        path: &Path,
        source: SourceKind,
    ) -> Result<(usize, UpsertCounts), ImportError> {
        let extractor = get_extractor(source);
        let reconciler = UpsertReconciler::new(self.options.batch_size);

        let mut seen = 0usize;
        let mut totals = UpsertCounts::default();

        for group in extractor.extract(path, self.options.group_size)? {
            let rows = group?;

            let records = rows
                .iter()
                .enumerate()
                .map(|(idx, row)| {
                    normalize(row, source).map_err(|e| ImportError::Normalization {
                        row: seen + idx + 1,
                        source: e,
                    })
                })
                .collect::<Result<Vec<CanonicalRecord>, ImportError>>()?;
            seen += rows.len();
            drop(rows);

            let counts = reconciler.reconcile(self.store, records)?;
            totals.created += counts.created;
            totals.updated += counts.updated;

            debug!(
                records = seen,
                created = counts.created,
                updated = counts.updated,
                "group done"
            );
        }

        Ok((seen, totals))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::error::{NormalizationError, StoreError};
    use crate::parser::SourceKind;
    use crate::store::AuditEntry;
    use std::cell::RefCell;
    use std::io::Write;

    /// Audit sink that remembers what it was told
    #[derive(Default)]
    struct RecordingAudit {
        entries: RefCell<Vec<(SourceKind, String)>>,
    }

    impl AuditSink for RecordingAudit {
        fn record(&self, source: SourceKind, filename: &str) -> Result<AuditEntry, StoreError> {
            self.entries.borrow_mut().push((source, filename.to_string()));
            Ok(AuditEntry::new(source, filename))
        }
    }

    fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        path
    }

    const CSV_HEADER: &str =
        "poi_id,poi_name,poi_latitude,poi_longitude,poi_category,poi_ratings\n";

    #[test]
    fn test_options_validation() {
        assert!(ImportOptions::new(0, 5).is_err());
        assert!(ImportOptions::new(5, 0).is_err());
        let options = ImportOptions::new(5, 7).unwrap();
        assert_eq!((options.group_size(), options.batch_size()), (5, 7));

        let defaults = ImportOptions::default();
        assert_eq!(defaults.group_size(), 100_000);
        assert_eq!(defaults.batch_size(), 10_000);
    }

    #[test]
    fn test_stats_display() {
        let stats = ImportStats {
            files_processed: 1,
            created: 2,
            updated: 3,
        };
        assert_eq!(stats.to_string(), "Files processed: 1 | created: 2 | updated: 3");
    }

    #[test]
    fn test_run_multiple_files_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_fixture(
            &dir,
            "pois.csv",
            &format!("{}E1,Park,1.1,2.2,park,\"4,5\"\nE2,Zoo,3,4,zoo,5\n", CSV_HEADER),
        );
        let json = write_fixture(
            &dir,
            "pois.json",
            "{\"id\": \"E2\", \"name\": \"Zoo\", \"coordinates\": [3, 4], \"category\": \"zoo\"}\n\
             {\"id\": \"J1\", \"name\": \"Lake\", \
             \"coordinates\": {\"latitude\": 5, \"longitude\": 6}, \"category\": \"lake\"}\n",
        );

        let store = SqliteStore::open_in_memory().unwrap();
        let audit = RecordingAudit::default();
        let service = ImportService::new(&store, &audit, ImportOptions::new(1, 1).unwrap());

        let stats = service.run(&[&csv, &json]).unwrap();
        assert_eq!(
            stats,
            ImportStats {
                files_processed: 2,
                created: 3,
                updated: 1
            }
        );
        assert_eq!(
            *audit.entries.borrow(),
            vec![
                (SourceKind::Tabular, "pois.csv".to_string()),
                (SourceKind::Structured, "pois.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_failure_aborts_run_and_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_fixture(&dir, "good.csv", &format!("{}E1,Park,1,2,park,4\n", CSV_HEADER));
        let bad = write_fixture(&dir, "bad.csv", &format!("{}E2,Zoo,north,2,zoo,4\n", CSV_HEADER));

        let store = SqliteStore::open_in_memory().unwrap();
        let audit = RecordingAudit::default();
        let service = ImportService::new(&store, &audit, ImportOptions::default());

        let err = service.run(&[&good, &bad]).unwrap_err();
        assert_eq!(err.path, bad);
        assert!(matches!(
            err.source,
            ImportError::Normalization {
                row: 1,
                source: NormalizationError::InvalidNumber { .. }
            }
        ));
        // The good file was committed and audited before the failure
        assert_eq!(store.count_pois().unwrap(), 1);
        assert_eq!(audit.entries.borrow().len(), 1);
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let audit = RecordingAudit::default();
        let service = ImportService::new(&store, &audit, ImportOptions::default());

        let missing = dir.path().join("nope.csv");
        let err = service.run(&[&missing]).unwrap_err();
        assert!(matches!(err.source, ImportError::FileNotFound(_)));

        let text = write_fixture(&dir, "pois.txt", "hello");
        let err = service.run(&[&text]).unwrap_err();
        assert!(matches!(err.source, ImportError::UnsupportedFormat { .. }));
        assert!(audit.entries.borrow().is_empty());
    }

    #[test]
    fn test_earlier_groups_stay_committed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            &dir,
            "pois.csv",
            &format!("{}E1,One,1,2,c,4\nE2,Two,1,2,c,4\nE3,Three,bad,2,c,4\n", CSV_HEADER),
        );

        let store = SqliteStore::open_in_memory().unwrap();
        let audit = RecordingAudit::default();
        let service = ImportService::new(&store, &audit, ImportOptions::new(2, 10).unwrap());

        let err = service.import_file(&path).unwrap_err();
        assert!(matches!(err, ImportError::Normalization { row: 3, .. }));
        assert_eq!(store.count_pois().unwrap(), 2);
        assert!(audit.entries.borrow().is_empty());
    }

    #[test]
    fn test_run_each_keeps_partial_stats() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_fixture(&dir, "good.csv", &format!("{}E1,Park,1,2,park,4\n", CSV_HEADER));
        let missing = dir.path().join("missing.xml");

        let store = SqliteStore::open_in_memory().unwrap();
        let audit = RecordingAudit::default();
        let service = ImportService::new(&store, &audit, ImportOptions::default());

        let report = service.run_each(&[&missing, &good]);
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, missing);
        assert_eq!(
            report.stats,
            ImportStats {
                files_processed: 1,
                created: 1,
                updated: 0
            }
        );
    }
}

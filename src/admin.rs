// 🔎 Admin listing - list/filter/search options as plain config, plus the
// lookups a browsing surface needs. Nothing interactive lives here.

use crate::db::SqliteStore;
use crate::error::StoreError;
use crate::parser::SourceKind;
use crate::store::{AuditEntry, StoredPoi};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

/// Which fields a listing shows, filters and searches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminView {
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    pub list_per_page: usize,
}

pub const POI_ADMIN: AdminView = AdminView {
    list_display: &["id", "name", "external_id", "category", "avg_rating"],
    list_filter: &["category"],
    search_fields: &["external_id", "name"],
    readonly_fields: &["created_at", "updated_at"],
    list_per_page: 50,
};

pub const IMPORT_HISTORY_ADMIN: AdminView = AdminView {
    list_display: &["id", "source", "filename", "timestamp"],
    list_filter: &["source"],
    search_fields: &["source"],
    readonly_fields: &["timestamp"],
    list_per_page: 50,
};

impl AdminView {
    fn offset(&self, page: usize) -> usize {
        page.saturating_sub(1) * self.list_per_page
    }
}

// ============================================================================
// SEARCH
// ============================================================================

/// How a free-text search term is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// A UUID: exact match on the store-assigned id
    InternalId(Uuid),
    /// All digits: exact match on external_id
    ExternalId(String),
    /// Anything else: substring of external_id or name
    Text(String),
}

impl SearchTerm {
    pub fn classify(term: &str) -> SearchTerm {
        let term = term.trim();
        if let Ok(id) = Uuid::parse_str(term) {
            SearchTerm::InternalId(id)
        } else if !term.is_empty() && term.chars().all(|c| c.is_ascii_digit()) {
            SearchTerm::ExternalId(term.to_string())
        } else {
            SearchTerm::Text(term.to_string())
        }
    }
}

/// One page (1-based) of POIs matching `term`
pub fn search_pois(
    store: &SqliteStore,
    term: &str,
    page: usize,
) -> Result<Vec<StoredPoi>, StoreError> {
    let limit = POI_ADMIN.list_per_page;
    let offset = POI_ADMIN.offset(page);

    match SearchTerm::classify(term) {
        // At most one hit, all of it on the first page
        SearchTerm::InternalId(_) if offset > 0 => Ok(Vec::new()),
        SearchTerm::InternalId(id) => {
            let found = store.get_poi_by_id(&id.to_string())?;
            Ok(found.into_iter().collect())
        }
        SearchTerm::ExternalId(external_id) => {
            store.query_pois("external_id = ?1", &[SqlValue::Text(external_id)], limit, offset)
        }
        SearchTerm::Text(text) if text.is_empty() => store.query_pois("1 = 1", &[], limit, offset),
        SearchTerm::Text(text) => {
            let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
            store.query_pois(
                "lower(external_id) LIKE ?1 ESCAPE '\\' OR lower(name) LIKE ?1 ESCAPE '\\'",
                &[SqlValue::Text(pattern)],
                limit,
                offset,
            )
        }
    }
}

/// One page (1-based) of POIs in a category
pub fn filter_by_category(
    store: &SqliteStore,
    category: &str,
    page: usize,
) -> Result<Vec<StoredPoi>, StoreError> {
    store.query_pois(
        "category = ?1",
        &[SqlValue::Text(category.to_string())],
        POI_ADMIN.list_per_page,
        POI_ADMIN.offset(page),
    )
}

/// One page (1-based) of import history, newest first
pub fn list_imports(
    store: &SqliteStore,
    source: Option<SourceKind>,
    page: usize,
) -> Result<Vec<AuditEntry>, StoreError> {
    store.import_history(
        source,
        IMPORT_HISTORY_ADMIN.list_per_page,
        IMPORT_HISTORY_ADMIN.offset(page),
    )
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// TESTS
// ============================================================================

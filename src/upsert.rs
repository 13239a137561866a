// 🔁 Upsert Reconciler - create-if-absent, else update-in-place, by external_id
//
// One reconcile() call = one atomic unit against the store. A failing group
// rolls back only itself; groups committed earlier stay committed.

use crate::error::StoreError;
use crate::normalize::CanonicalRecord;
use crate::store::{PoiField, PoiStore, StoredPoi};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Split `items` into consecutive slices of at most `size` (min 1).
/// ceil(n / size) slices, all full except possibly the last.
pub fn batched<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Exact result of one reconcile() call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub created: usize,
    pub updated: usize,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct UpsertReconciler {
    /// Upper bound on rows per bulk write
    pub batch_size: usize,
}

impl UpsertReconciler {
    pub fn new(batch_size: usize) -> Self {
        UpsertReconciler {
            batch_size: batch_size.max(1),
        }
    }

    /// Reconcile one group of records against the store, atomically.
    /// A failed write or a failed commit both end in rollback().
    pub fn reconcile<S>(
        &self,
        store: &S,
        records: Vec<CanonicalRecord>,
    ) -> Result<UpsertCounts, StoreError>
    where
        S: PoiStore + ?Sized,
    {
        if records.is_empty() {
            return Ok(UpsertCounts::default());
        }

        store.begin()?;
        let result = self
            .write_group(store, records)
            .and_then(|counts| store.commit().map(|()| counts));

        if let Err(e) = &result {
            if let Err(rollback_err) = store.rollback() {
                warn!(
                    error = %e,
                    rollback_error = %rollback_err,
                    "rollback failed after reconcile error"
                );
            }
        }
        result
    }

    fn write_group<S>(
        &self,
        store: &S,
        records: Vec<CanonicalRecord>,
    ) -> Result<UpsertCounts, StoreError>
    where
        S: PoiStore + ?Sized,
    {
        // 1. One bulk lookup for the distinct keys of the group
        let mut seen = HashSet::with_capacity(records.len());
        let keys: Vec<String> = records
            .iter()
            .filter(|r| seen.insert(r.external_id.as_str()))
            .map(|r| r.external_id.clone())
            .collect();
        let existing = store.find_by_external_ids(&keys)?;

        // 2. Partition
        let (to_create, to_update) = partition(records, existing);

        // 3. Sub-batched writes, creates first
        let mut counts = UpsertCounts::default();
        for batch in batched(&to_create, self.batch_size) {
            counts.created += store.bulk_create(batch, self.batch_size)?;
        }
        for batch in batched(&to_update, self.batch_size) {
            counts.updated += store.bulk_update(batch, &PoiField::ALL, self.batch_size)?;
        }

        debug!(
            created = counts.created,
            updated = counts.updated,
            "group reconciled"
        );
        Ok(counts)
    }
}

/// Records whose key is already stored become updates (mutable fields
/// overwritten, identity kept); everything else becomes a create.
fn partition(
    records: Vec<CanonicalRecord>,
    existing: std::collections::HashMap<String, StoredPoi>,
) -> (Vec<CanonicalRecord>, Vec<StoredPoi>) {
    let mut to_create = Vec::new();
    let mut to_update = Vec::new();

    for record in records {
        match existing.get(&record.external_id) {
            Some(current) => {
                let mut entity = current.clone();
                entity.apply(&record);
                to_update.push(entity);
            }
            None => to_create.push(record),
        }
    }

    (to_create, to_update)
}

// ============================================================================
// TESTS
// ============================================================================

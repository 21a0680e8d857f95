//! Per-model metadata cache validated against the engine's freshness marker.
//!
//! Entries are keyed by connection identity and never served when their
//! stored marker is older than a successfully obtained current marker. When
//! the current marker cannot be determined the cached value is trusted
//! (availability over consistency); see [`is_fresh`].
//!
//! The map mutex only guards reads and writes. Fetches run outside it, so two
//! concurrent misses on the same entry may both fetch; the later write wins.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;

use crate::error::CubistError;
use crate::models::{
    FreshnessMarker, ModelCacheEntry, SchemaCacheEntry, TableSchema, TableSummary,
};

/// Decide whether data captured at `cached` may be served when the engine
/// currently reports `current`.
///
/// | cached  | current | fresh?            |
/// |---------|---------|-------------------|
/// | unknown | unknown | yes               |
/// | unknown | known   | no (backfill)     |
/// | known   | unknown | yes (fail open)   |
/// | v1      | v2      | iff `v1 >= v2`    |
pub fn is_fresh(cached: FreshnessMarker, current: FreshnessMarker) -> bool {
    match (cached, current) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => true,
        (Some(cached), Some(current)) => cached >= current,
    }
}

/// Process-local metadata cache.
#[derive(Default)]
pub struct MetadataCache {
    models: Mutex<HashMap<String, ModelCacheEntry>>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model's table list, calling `fetch` when the cached list is
    /// absent or stale relative to `current`.
    pub async fn get_tables<F, Fut>(
        &self,
        model_key: &str,
        current: FreshnessMarker,
        fetch: F,
    ) -> Result<Vec<TableSummary>, CubistError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TableSummary>, CubistError>>,
    {
        {
            let models = self.models.lock();
            if let Some(entry) = models.get(model_key) {
                if let Some(tables) = &entry.tables {
                    if is_fresh(entry.marker, current) {
                        tracing::debug!(model = %model_key, "Table list served from cache");
                        return Ok(tables.clone());
                    }
                    tracing::debug!(
                        model = %model_key,
                        cached = ?entry.marker,
                        current = ?current,
                        "Cached table list is stale"
                    );
                }
            }
        }

        let tables = fetch().await?;

        let mut models = self.models.lock();
        let entry = models.entry(model_key.to_string()).or_default();
        entry.tables = Some(tables.clone());
        entry.marker = current.or(entry.marker);
        tracing::debug!(model = %model_key, tables = tables.len(), "Table list cached");

        Ok(tables)
    }

    /// Return one table's schema, calling `fetch` when the cached schema is
    /// absent or stale relative to `current`.
    ///
    /// Table schemas are independent: fetching one never refreshes or
    /// invalidates another.
    pub async fn get_table_schema<F, Fut>(
        &self,
        model_key: &str,
        table: &str,
        current: FreshnessMarker,
        fetch: F,
    ) -> Result<TableSchema, CubistError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TableSchema, CubistError>>,
    {
        {
            let models = self.models.lock();
            if let Some(cached) = models.get(model_key).and_then(|m| m.table_schemas.get(table)) {
                if is_fresh(cached.marker, current) {
                    tracing::debug!(model = %model_key, table = %table, "Schema served from cache");
                    return Ok(cached.data.clone());
                }
            }
        }

        let schema = fetch().await?;

        let mut models = self.models.lock();
        let entry = models.entry(model_key.to_string()).or_default();
        if entry.marker.is_none() && current.is_some() {
            // A table list captured without a marker must not pass as fresh
            // under the adopted one.
            if entry.tables.take().is_some() {
                tracing::debug!(model = %model_key, "Unmarked table list dropped");
            }
            entry.marker = current;
        }
        entry
            .table_schemas
            .insert(table.to_string(), SchemaCacheEntry { data: schema.clone(), marker: current });
        tracing::debug!(model = %model_key, table = %table, "Schema cached");

        Ok(schema)
    }

    /// Marker stored for a model, if the model has an entry.
    pub fn marker(&self, model_key: &str) -> Option<FreshnessMarker> {
        self.models.lock().get(model_key).map(|entry| entry.marker)
    }

    /// Number of models with an entry.
    pub fn model_count(&self) -> usize {
        self.models.lock().len()
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache").field("models", &self.model_count()).finish()
    }
}

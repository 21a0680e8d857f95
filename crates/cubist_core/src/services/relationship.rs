//! Relationship resolution.
//!
//! Turns the engine's id-based relationship rows into per-table views. One
//! batched pass reads the tables, columns and relationships views once and
//! resolves every requested table; when that pass fails the resolver falls
//! back to one lookup per table on the worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::models::{RawColumn, RawRelationship, RawTable, RelationshipView};
use crate::services::executor::EngineExecutor;
use crate::services::metadata::ModelMetadataSource;

/// Relationship type recorded on the from side.
pub const MANY_TO_ONE: &str = "Many-to-One";

/// Relationship type recorded on the to side.
pub const ONE_TO_MANY: &str = "One-to-Many";

/// Name of a cardinality code.
pub fn cardinality_name(code: i64) -> &'static str {
    match code {
        1 => "One",
        2 => "Many",
        _ => "Unknown",
    }
}

/// Render a cardinality pair, e.g. `(2, 1)` as `"Many-to-One"`.
pub fn format_cardinality(from_cardinality: i64, to_cardinality: i64) -> String {
    format!("{}-to-{}", cardinality_name(from_cardinality), cardinality_name(to_cardinality))
}

/// Name of a cross-filtering behavior code.
pub fn format_cross_filter(code: i64) -> &'static str {
    match code {
        1 => "Single",
        2 => "Both",
        3 => "Automatic",
        4 => "None",
        _ => "Unknown",
    }
}

/// Resolve every relationship into views for the requested tables.
///
/// Each relationship yields a Many-to-One view on its from table and a
/// One-to-Many view on its to table, with columns and cardinality oriented
/// from the receiving table's side. Relationships whose table or column ids
/// cannot be resolved are skipped. Every requested table gets an entry, even
/// when empty; unrequested tables are ignored.
pub fn resolve_all(
    table_names: &[String],
    tables: &[RawTable],
    columns: &[RawColumn],
    relationships: &[RawRelationship],
) -> HashMap<String, Vec<RelationshipView>> {
    let table_names_by_id: HashMap<i64, &str> =
        tables.iter().map(|t| (t.id, t.name.as_str())).collect();
    let columns_by_id: HashMap<i64, &RawColumn> = columns.iter().map(|c| (c.id, c)).collect();

    let mut resolved: HashMap<String, Vec<RelationshipView>> =
        table_names.iter().map(|name| (name.clone(), Vec::new())).collect();

    for rel in relationships {
        let from_table = table_names_by_id.get(&rel.from_table_id);
        let to_table = table_names_by_id.get(&rel.to_table_id);
        let (Some(&from_table), Some(&to_table)) = (from_table, to_table) else {
            tracing::debug!(
                from_table_id = rel.from_table_id,
                to_table_id = rel.to_table_id,
                "Skipping relationship with unknown table"
            );
            continue;
        };

        let from_column = columns_by_id.get(&rel.from_column_id);
        let to_column = columns_by_id.get(&rel.to_column_id);
        let (Some(from_column), Some(to_column)) = (from_column, to_column) else {
            tracing::debug!(
                from_column_id = rel.from_column_id,
                to_column_id = rel.to_column_id,
                "Skipping relationship with unknown column"
            );
            continue;
        };

        let cross_filter = format_cross_filter(rel.cross_filter_behavior);

        if let Some(views) = resolved.get_mut(from_table) {
            views.push(RelationshipView {
                related_table: to_table.to_string(),
                from_column: from_column.name.clone(),
                to_column: to_column.name.clone(),
                cardinality: format_cardinality(rel.from_cardinality, rel.to_cardinality),
                is_active: rel.is_active,
                cross_filter_direction: cross_filter.to_string(),
                relationship_type: MANY_TO_ONE.to_string(),
            });
        }

        if let Some(views) = resolved.get_mut(to_table) {
            views.push(RelationshipView {
                related_table: from_table.to_string(),
                from_column: to_column.name.clone(),
                to_column: from_column.name.clone(),
                cardinality: format_cardinality(rel.to_cardinality, rel.from_cardinality),
                is_active: rel.is_active,
                cross_filter_direction: cross_filter.to_string(),
                relationship_type: ONE_TO_MANY.to_string(),
            });
        }
    }

    resolved
}

/// Relationship views for `table_names`, batched when possible.
///
/// A failed batch falls back to per-table lookups dispatched concurrently on
/// `executor`; a failed per-table lookup only empties that table's list.
pub async fn resolve_relationships(
    source: Arc<dyn ModelMetadataSource>,
    executor: &EngineExecutor,
    table_names: &[String],
) -> HashMap<String, Vec<RelationshipView>> {
    let names = table_names.to_vec();
    let batch = executor.with(source.clone(), move |s| s.relationships(&names)).await;

    match batch {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(error = %e, "Batch relationship lookup failed, resolving per table");
            let lookups = table_names.iter().cloned().map(|name| {
                let source = source.clone();
                async move {
                    let table = name.clone();
                    let views = executor
                        .with(source, move |s| s.table_relationships(&table))
                        .await
                        .unwrap_or_else(|e| {
                            tracing::warn!(table = %name, error = %e, "Relationship lookup failed");
                            Vec::new()
                        });
                    (name, views)
                }
            });
            join_all(lookups).await.into_iter().collect()
        }
    }
}

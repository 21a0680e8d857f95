//! Table discovery and schema introspection.
//!
//! Reads the model catalog through a [`ModelMetadataSource`] on the worker
//! pool. Discovery prefers batched reads and falls back to per-table reads
//! when a batch fails; per-table failures degrade to defaults instead of
//! failing the whole listing.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::error::CubistError;
use crate::models::{ColumnDescription, ColumnDetail, TableSchema, TableSummary, NO_DESCRIPTION};
use crate::services::executor::EngineExecutor;
use crate::services::metadata::ModelMetadataSource;
use crate::services::relationship::resolve_relationships;

/// Schema introspection service.
pub struct SchemaService;

impl SchemaService {
    /// List the model's user tables with descriptions and relationships.
    pub async fn discover_tables(
        source: Arc<dyn ModelMetadataSource>,
        executor: &EngineExecutor,
    ) -> Result<Vec<TableSummary>, CubistError> {
        let table_names = executor.with(source.clone(), |s| s.table_names()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to discover tables");
            e
        })?;

        let mut descriptions = Self::table_descriptions(source.clone(), executor, &table_names).await;
        let mut relationships = resolve_relationships(source, executor, &table_names).await;

        Ok(table_names
            .into_iter()
            .map(|name| TableSummary {
                description: descriptions
                    .remove(&name)
                    .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                relationships: relationships.remove(&name).unwrap_or_default(),
                name,
            })
            .collect())
    }

    /// Descriptions for `table_names`, batched when possible.
    async fn table_descriptions(
        source: Arc<dyn ModelMetadataSource>,
        executor: &EngineExecutor,
        table_names: &[String],
    ) -> HashMap<String, String> {
        let names = table_names.to_vec();
        match executor.with(source.clone(), move |s| s.table_descriptions(&names)).await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                tracing::warn!(error = %e, "Batch description lookup failed, reading per table");
                let lookups = table_names.iter().cloned().map(|name| {
                    let source = source.clone();
                    async move {
                        let table = name.clone();
                        let description = executor
                            .with(source, move |s| s.table_description(&table))
                            .await
                            .unwrap_or_else(|e| {
                                tracing::warn!(table = %name, error = %e, "Description lookup failed");
                                None
                            });
                        description.map(|d| (name, d))
                    }
                });
                join_all(lookups).await.into_iter().flatten().collect()
            }
        }
    }

    /// Describe one table.
    ///
    /// Tables whose rows can be read become [`TableSchema::DataTable`]. When
    /// reading fails the table is treated as holding only measures; a table
    /// the catalog does not know becomes [`TableSchema::Unknown`].
    pub async fn get_table_schema(
        source: Arc<dyn ModelMetadataSource>,
        executor: &EngineExecutor,
        table: &str,
    ) -> Result<TableSchema, CubistError> {
        let owned = table.to_string();
        let description = executor
            .with(source.clone(), move |s| s.table_description(&owned))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(table = %table, error = %e, "Description lookup failed");
                None
            })
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        let owned = table.to_string();
        let probed = executor.with(source.clone(), move |s| s.probe_columns(&owned)).await;

        match probed {
            Ok(columns) => {
                let owned = table.to_string();
                let catalog = executor
                    .with(source, move |s| s.column_descriptions(&owned))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(table = %table, error = %e, "Column description lookup failed");
                        Vec::new()
                    });
                Ok(TableSchema::DataTable {
                    table_name: table.to_string(),
                    description,
                    columns: match_columns(columns, &catalog),
                })
            }
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    error = %e,
                    "Failed to read table rows, treating as measure table"
                );
                let owned = table.to_string();
                let measures = executor.with(source, move |s| s.measures(&owned)).await?;
                Ok(match measures {
                    Some(measures) => TableSchema::MeasureTable {
                        table_name: table.to_string(),
                        description,
                        measures,
                    },
                    None => TableSchema::Unknown { table_name: table.to_string(), description },
                })
            }
        }
    }
}

/// Pair probed column names with their catalog entries.
///
/// Names match exactly first. An exact match without a description gives way
/// to a match on the bracketed part of `Table[Column]`.
pub fn match_columns(probed: Vec<String>, catalog: &[ColumnDescription]) -> Vec<ColumnDetail> {
    probed
        .into_iter()
        .map(|name| {
            let exact = catalog.iter().find(|c| c.name == name);
            let entry = match exact {
                Some(c) if has_description(c) => exact,
                _ => bare_column_name(&name)
                    .and_then(|bare| catalog.iter().find(|c| c.name == bare))
                    .or(exact),
            };
            ColumnDetail {
                description: entry
                    .and_then(|c| c.description.clone())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                data_type: entry.and_then(|c| c.data_type),
                name,
            }
        })
        .collect()
}

fn has_description(column: &ColumnDescription) -> bool {
    column.description.as_deref().is_some_and(|d| !d.is_empty())
}

/// `Column` from `Table[Column]`.
fn bare_column_name(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once('[')?;
    Some(rest.trim_end_matches(']'))
}

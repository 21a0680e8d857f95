//! Model metadata reads.
//!
//! [`ModelMetadataSource`] exposes every catalog read discovery needs, with
//! both a batched and a per-item form where the engine allows either. Callers
//! pick the strategy; nothing here probes for optional capabilities.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::engine::{quote_table, EngineSession, MetadataFilter, MetadataRow, SystemView};
use crate::error::CubistError;
use crate::models::{
    ColumnDataType, ColumnDescription, MeasureInfo, RawColumn, RawRelationship, RawTable,
    RelationshipView,
};
use crate::services::relationship::resolve_all;

/// Schema name of the engine's own system tables.
const SYSTEM_SCHEMA: &str = "$SYSTEM";

/// Prefix of the hidden auto date/time template tables.
const DATE_TEMPLATE_PREFIX: &str = "DateTableTemplate_";

/// Blocking catalog reads against one model.
pub trait ModelMetadataSource: Send + Sync {
    /// User-facing table names, in catalog order.
    fn table_names(&self) -> Result<Vec<String>, CubistError>;

    /// Descriptions of `tables` in one round trip. Tables without a
    /// description are absent from the map.
    fn table_descriptions(&self, tables: &[String])
        -> Result<HashMap<String, String>, CubistError>;

    /// Description of one table.
    fn table_description(&self, table: &str) -> Result<Option<String>, CubistError>;

    /// Relationship views for `tables` in one round trip.
    fn relationships(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, Vec<RelationshipView>>, CubistError>;

    /// Relationship views for one table.
    fn table_relationships(&self, table: &str) -> Result<Vec<RelationshipView>, CubistError>;

    /// Catalog descriptions of a table's columns, sorted by name.
    fn column_descriptions(&self, table: &str) -> Result<Vec<ColumnDescription>, CubistError>;

    /// Column names reported by reading one row of the table.
    ///
    /// Fails for tables that hold no enumerable rows.
    fn probe_columns(&self, table: &str) -> Result<Vec<String>, CubistError>;

    /// Measures defined on a table, sorted by name, or `None` when the
    /// catalog does not know the table.
    fn measures(&self, table: &str) -> Result<Option<Vec<MeasureInfo>>, CubistError>;
}

/// [`ModelMetadataSource`] backed by an engine session.
pub struct SessionMetadataSource {
    session: Arc<dyn EngineSession>,
}

impl SessionMetadataSource {
    pub fn new(session: Arc<dyn EngineSession>) -> Self {
        Self { session }
    }

    fn rows(
        &self,
        view: SystemView,
        filter: MetadataFilter,
    ) -> Result<Vec<MetadataRow>, CubistError> {
        self.session.metadata_query(view, &filter)
    }

    fn table_id(&self, table: &str) -> Result<Option<i64>, CubistError> {
        let rows = self.rows(SystemView::Tables, MetadataFilter::none().eq("Name", table))?;
        Ok(rows.iter().find_map(|row| row.get_i64("ID")))
    }

    fn raw_tables(&self, filter: MetadataFilter) -> Result<Vec<RawTable>, CubistError> {
        Ok(self.rows(SystemView::Tables, filter)?.iter().filter_map(parse_table).collect())
    }

    fn raw_columns(&self, filter: MetadataFilter) -> Result<Vec<RawColumn>, CubistError> {
        Ok(self.rows(SystemView::Columns, filter)?.iter().filter_map(parse_column).collect())
    }

    fn raw_relationships(
        &self,
        filter: MetadataFilter,
    ) -> Result<Vec<RawRelationship>, CubistError> {
        Ok(self
            .rows(SystemView::Relationships, filter)?
            .iter()
            .filter_map(parse_relationship)
            .collect())
    }
}

impl ModelMetadataSource for SessionMetadataSource {
    fn table_names(&self) -> Result<Vec<String>, CubistError> {
        let rows = self.rows(SystemView::SchemaTables, MetadataFilter::none())?;
        let mut seen = HashSet::new();
        let names: Vec<String> = rows
            .iter()
            .filter(|row| row.get_str("TABLE_SCHEMA") != Some(SYSTEM_SCHEMA))
            .filter_map(|row| row.get_str("TABLE_NAME"))
            .filter(|name| is_user_table(name))
            .filter(|name| seen.insert(name.to_string()))
            .map(str::to_string)
            .collect();
        tracing::info!(tables = names.len(), "Found model tables");
        Ok(names)
    }

    fn table_descriptions(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, String>, CubistError> {
        let wanted: HashSet<&str> = tables.iter().map(String::as_str).collect();
        let rows = self.rows(SystemView::Tables, MetadataFilter::none())?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_str("Name")?;
                let description = row.get_str("Description")?;
                wanted.contains(name).then(|| (name.to_string(), description.to_string()))
            })
            .collect())
    }

    fn table_description(&self, table: &str) -> Result<Option<String>, CubistError> {
        let rows = self.rows(SystemView::Tables, MetadataFilter::none().eq("Name", table))?;
        Ok(rows.iter().find_map(|row| row.get_str("Description").map(str::to_string)))
    }

    fn relationships(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, Vec<RelationshipView>>, CubistError> {
        let raw_tables = self.raw_tables(MetadataFilter::none())?;
        let raw_columns = self.raw_columns(MetadataFilter::none())?;
        let raw_relationships = self.raw_relationships(MetadataFilter::none())?;
        tracing::debug!(relationships = raw_relationships.len(), "Read model relationships");
        Ok(resolve_all(tables, &raw_tables, &raw_columns, &raw_relationships))
    }

    fn table_relationships(&self, table: &str) -> Result<Vec<RelationshipView>, CubistError> {
        let Some(table_id) = self.table_id(table)? else {
            return Ok(Vec::new());
        };

        let mut raw = self.raw_relationships(MetadataFilter::none().eq("FromTableID", table_id))?;
        raw.extend(
            self.raw_relationships(MetadataFilter::none().eq("ToTableID", table_id))?
                .into_iter()
                .filter(|rel| rel.from_table_id != table_id),
        );

        let mut raw_tables = Vec::new();
        let mut raw_columns = Vec::new();
        let mut seen_tables = HashSet::new();
        let mut seen_columns = HashSet::new();
        for rel in &raw {
            for id in [rel.from_table_id, rel.to_table_id] {
                if seen_tables.insert(id) {
                    raw_tables.extend(self.raw_tables(MetadataFilter::none().eq("ID", id))?);
                }
            }
            for id in [rel.from_column_id, rel.to_column_id] {
                if seen_columns.insert(id) {
                    raw_columns.extend(self.raw_columns(MetadataFilter::none().eq("ID", id))?);
                }
            }
        }

        let names = [table.to_string()];
        let mut resolved = resolve_all(&names, &raw_tables, &raw_columns, &raw);
        Ok(resolved.remove(table).unwrap_or_default())
    }

    fn column_descriptions(&self, table: &str) -> Result<Vec<ColumnDescription>, CubistError> {
        let Some(table_id) = self.table_id(table)? else {
            return Ok(Vec::new());
        };
        let rows = self.rows(SystemView::Columns, MetadataFilter::none().eq("TableID", table_id))?;
        let mut columns: Vec<ColumnDescription> = rows
            .iter()
            .map(|row| ColumnDescription {
                name: row.get_str("ExplicitName").unwrap_or("Unknown").to_string(),
                description: row.get_str("Description").map(str::to_string),
                data_type: row.get_i64("ExplicitDataType").map(ColumnDataType::from_code),
            })
            .collect();
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(columns)
    }

    fn probe_columns(&self, table: &str) -> Result<Vec<String>, CubistError> {
        let rows = self.session.query(&format!("EVALUATE TOPN(1, {})", quote_table(table)))?;
        Ok(rows.columns)
    }

    fn measures(&self, table: &str) -> Result<Option<Vec<MeasureInfo>>, CubistError> {
        let Some(table_id) = self.table_id(table)? else {
            return Ok(None);
        };
        let rows =
            self.rows(SystemView::Measures, MetadataFilter::none().eq("TableID", table_id))?;
        let mut measures: Vec<MeasureInfo> = rows
            .iter()
            .filter_map(|row| {
                Some(MeasureInfo {
                    name: row.get_str("Name")?.to_string(),
                    expression: row.get_str("Expression").unwrap_or_default().to_string(),
                })
            })
            .collect();
        measures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(measures))
    }
}

/// Whether a schema-rowset table name is visible to model users.
pub fn is_user_table(name: &str) -> bool {
    !name.starts_with('$') && !name.starts_with(DATE_TEMPLATE_PREFIX)
}

fn parse_table(row: &MetadataRow) -> Option<RawTable> {
    Some(RawTable { id: row.get_i64("ID")?, name: row.get_str("Name")?.to_string() })
}

fn parse_column(row: &MetadataRow) -> Option<RawColumn> {
    Some(RawColumn {
        id: row.get_i64("ID")?,
        name: row.get_str("ExplicitName")?.to_string(),
        table_id: row.get_i64("TableID")?,
    })
}

fn parse_relationship(row: &MetadataRow) -> Option<RawRelationship> {
    Some(RawRelationship {
        from_table_id: row.get_i64("FromTableID")?,
        to_table_id: row.get_i64("ToTableID")?,
        from_column_id: row.get_i64("FromColumnID")?,
        to_column_id: row.get_i64("ToColumnID")?,
        is_active: row.get_bool("IsActive").unwrap_or(false),
        cross_filter_behavior: row.get_i64("CrossFilteringBehavior").unwrap_or(0),
        from_cardinality: row.get_i64("FromCardinality").unwrap_or(0),
        to_cardinality: row.get_i64("ToCardinality").unwrap_or(0),
    })
}

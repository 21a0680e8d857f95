//! Tabular model metadata.
//!
//! Data structures returned by table discovery and schema introspection, plus
//! the raw id-based records read from the engine's system views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder used wherever the model carries no description.
pub const NO_DESCRIPTION: &str = "No description available";

/// Most recent schema or data change reported by the engine.
///
/// `None` means the engine could not tell us.
pub type FreshnessMarker = Option<DateTime<Utc>>;

/// A table as listed by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Table name.
    pub name: String,
    /// Table description, or [`NO_DESCRIPTION`].
    pub description: String,
    /// Relationships seen from this table's side.
    pub relationships: Vec<RelationshipView>,
}

/// One relationship as seen from one of its two tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipView {
    /// The table at the other end.
    pub related_table: String,
    /// Column on the receiving (local) table.
    pub from_column: String,
    /// Column on the related table.
    pub to_column: String,
    /// Cardinality from the local table's perspective, e.g. `"Many-to-One"`.
    pub cardinality: String,
    /// Whether the relationship is active.
    pub is_active: bool,
    /// `"Single"`, `"Both"`, `"Automatic"`, `"None"` or `"Unknown"`.
    pub cross_filter_direction: String,
    /// `"Many-to-One"` on the from side, `"One-to-Many"` on the to side.
    pub relationship_type: String,
}

/// A model table row keyed by engine id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub id: i64,
    pub name: String,
}

/// A model column row keyed by engine id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub id: i64,
    pub name: String,
    pub table_id: i64,
}

/// A relationship row exactly as the engine stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelationship {
    pub from_table_id: i64,
    pub to_table_id: i64,
    pub from_column_id: i64,
    pub to_column_id: i64,
    pub is_active: bool,
    pub cross_filter_behavior: i64,
    pub from_cardinality: i64,
    pub to_cardinality: i64,
}

/// Column data type as encoded by the engine's model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDataType {
    String,
    Int64,
    Double,
    DateTime,
    Decimal,
    Boolean,
    Binary,
    Variant,
    Unknown,
}

impl ColumnDataType {
    /// Decode an engine data type code.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Self::String,
            6 => Self::Int64,
            8 => Self::Double,
            9 => Self::DateTime,
            10 => Self::Decimal,
            11 => Self::Boolean,
            17 => Self::Binary,
            20 => Self::Variant,
            _ => Self::Unknown,
        }
    }
}

/// A column's catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDetail {
    /// Column name as reported by the data probe (may be `Table[Column]`).
    pub name: String,
    /// Column description, or [`NO_DESCRIPTION`].
    pub description: String,
    /// Data type, when the catalog knows the column.
    pub data_type: Option<ColumnDataType>,
}

/// Catalog description of one column, before matching against probed names.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub description: Option<String>,
    pub data_type: Option<ColumnDataType>,
}

/// A measure defined on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureInfo {
    /// Measure name.
    pub name: String,
    /// DAX expression.
    pub expression: String,
}

/// Detailed schema for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableSchema {
    /// A table whose rows can be enumerated.
    DataTable { table_name: String, description: String, columns: Vec<ColumnDetail> },
    /// A table holding only measures.
    MeasureTable { table_name: String, description: String, measures: Vec<MeasureInfo> },
    /// The model catalog does not know the table.
    Unknown { table_name: String, description: String },
}

impl TableSchema {
    /// Name of the described table.
    pub fn table_name(&self) -> &str {
        match self {
            Self::DataTable { table_name, .. }
            | Self::MeasureTable { table_name, .. }
            | Self::Unknown { table_name, .. } => table_name,
        }
    }

    /// Description of the described table.
    pub fn description(&self) -> &str {
        match self {
            Self::DataTable { description, .. }
            | Self::MeasureTable { description, .. }
            | Self::Unknown { description, .. } => description,
        }
    }

    /// Check whether rows of this table can be sampled.
    pub fn is_data_table(&self) -> bool {
        matches!(self, Self::DataTable { .. })
    }
}

/// Cached schema of a single table.
#[derive(Debug, Clone)]
pub struct SchemaCacheEntry {
    /// Cached schema.
    pub data: TableSchema,
    /// Freshness marker observed when `data` was fetched.
    pub marker: FreshnessMarker,
}

/// Everything cached for one model.
#[derive(Debug, Clone, Default)]
pub struct ModelCacheEntry {
    /// Marker the table list was captured at.
    pub marker: FreshnessMarker,
    /// Cached table list, if discovery ran.
    pub tables: Option<Vec<TableSummary>>,
    /// Per-table schemas, each with its own marker.
    pub table_schemas: HashMap<String, SchemaCacheEntry>,
}

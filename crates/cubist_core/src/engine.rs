//! Engine session collaborator interface.
//!
//! The native client that actually speaks XMLA lives outside this crate. It
//! is reached only through [`EngineSessionFactory`] and [`EngineSession`],
//! injected once when [`CubistState`](crate::state::CubistState) is built.
//! Both traits are blocking; callers dispatch them onto the
//! [`EngineExecutor`](crate::services::EngineExecutor).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::CubistError;
use crate::models::{ConnectionDescriptor, QueryRows};

/// An open session against the remote engine.
pub trait EngineSession: Send + Sync {
    /// Execute a DAX query.
    fn query(&self, text: &str) -> Result<QueryRows, CubistError>;

    /// Read rows from a system view, restricted by `filter`.
    fn metadata_query(
        &self,
        view: SystemView,
        filter: &MetadataFilter,
    ) -> Result<Vec<MetadataRow>, CubistError>;

    /// Whether the session is still usable. Must not perform I/O.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Opens engine sessions.
pub trait EngineSessionFactory: Send + Sync {
    /// Open a session for `descriptor`.
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn EngineSession>, CubistError>;
}

/// System views read by metadata discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemView {
    /// Model tables (`Name`, `ID`, `Description`).
    Tables,
    /// Model columns (`ID`, `ExplicitName`, `TableID`, `Description`, `ExplicitDataType`).
    Columns,
    /// Relationships between model columns.
    Relationships,
    /// Measures (`Name`, `Expression`, `TableID`).
    Measures,
    /// Schema rowset tables (`TABLE_NAME`, `TABLE_SCHEMA`).
    SchemaTables,
    /// Cubes (`LAST_SCHEMA_UPDATE`, `LAST_DATA_UPDATE`).
    Cubes,
}

impl SystemView {
    /// Fully qualified view name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tables => "$SYSTEM.TMSCHEMA_TABLES",
            Self::Columns => "$SYSTEM.TMSCHEMA_COLUMNS",
            Self::Relationships => "$SYSTEM.TMSCHEMA_RELATIONSHIPS",
            Self::Measures => "$SYSTEM.TMSCHEMA_MEASURES",
            Self::SchemaTables => "$SYSTEM.DBSCHEMA_TABLES",
            Self::Cubes => "$SYSTEM.MDSCHEMA_CUBES",
        }
    }
}

impl std::fmt::Display for SystemView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunction of column-equality restrictions on a system view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    restrictions: Vec<(String, Value)>,
}

impl MetadataFilter {
    /// No restriction.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add `column = value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.restrictions.push((column.into(), value.into()));
        self
    }

    /// Restrictions in insertion order.
    pub fn restrictions(&self) -> &[(String, Value)] {
        &self.restrictions
    }

    /// Whether `row` satisfies every restriction.
    pub fn matches(&self, row: &MetadataRow) -> bool {
        self.restrictions.iter().all(|(column, value)| row.get(column) == Some(value))
    }

    /// Render as a DMV `WHERE` clause (empty when unrestricted).
    pub fn to_where_clause(&self) -> String {
        if self.restrictions.is_empty() {
            return String::new();
        }
        let predicates: Vec<String> = self
            .restrictions
            .iter()
            .map(|(column, value)| match value {
                Value::String(text) => format!("[{column}] = '{}'", text.replace('\'', "''")),
                other => format!("[{column}] = {other}"),
            })
            .collect();
        format!(" WHERE {}", predicates.join(" AND "))
    }
}

/// One row of a system view, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRow(Map<String, Value>);

impl MetadataRow {
    /// Wrap a JSON object.
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Raw value of `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Non-empty string value of `column`.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Integer value of `column`, accepting numeric strings.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value of `column`, accepting 0/1.
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Timestamp value of `column`.
    ///
    /// Accepts RFC 3339 and the zone-less `YYYY-MM-DD[T ]HH:MM:SS[.f]` forms
    /// the engine emits; the latter are taken as UTC.
    pub fn get_timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        let text = self.get_str(column)?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(|naive| naive.and_utc())
    }
}

impl From<Map<String, Value>> for MetadataRow {
    fn from(values: Map<String, Value>) -> Self {
        Self(values)
    }
}

/// Quote a table name as a DAX table reference.
pub fn quote_table(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

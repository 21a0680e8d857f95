//! Query execution models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Raw tabular result handed back by an engine session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names, in result order.
    pub columns: Vec<String>,
    /// Row values, positionally aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    /// Create a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Convert rows into JSON objects keyed by column name.
    ///
    /// Values beyond the last named column are dropped.
    pub fn into_records(self) -> Vec<Map<String, Value>> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect::<Map<String, Value>>())
            .collect()
    }
}

/// Results from query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Identifier used to correlate log lines for this execution
    pub query_id: Uuid,
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Map<String, Value>>,
    /// Time to execute in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Get the number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

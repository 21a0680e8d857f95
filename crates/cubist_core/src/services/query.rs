//! DAX query execution.
//!
//! Queries run on the worker pool against a pooled session. Each execution
//! gets a fresh identifier so its log lines can be correlated. Results are
//! never cached.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::engine::{quote_table, EngineSession};
use crate::error::CubistError;
use crate::models::QueryResult;
use crate::services::executor::EngineExecutor;

/// Service for executing DAX queries.
pub struct QueryService;

impl QueryService {
    /// Execute `text` against `session`.
    ///
    /// # Errors
    /// Returns a query error for empty text, or whatever the engine reports.
    pub async fn execute(
        session: Arc<dyn EngineSession>,
        executor: &EngineExecutor,
        text: &str,
    ) -> Result<QueryResult, CubistError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CubistError::query("Query text is empty"));
        }

        let query_id = Uuid::new_v4();
        let start = Instant::now();
        tracing::debug!(query_id = %query_id, "Executing query");

        let owned = text.to_string();
        let result = executor.with(session, move |s| s.query(&owned)).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(query_id = %query_id, execution_time_ms, error = %e, "Query failed");
                return Err(e);
            }
        };

        let columns = rows.columns.clone();
        let rows = rows.into_records();
        tracing::debug!(
            query_id = %query_id,
            execution_time_ms,
            row_count = rows.len(),
            "Query completed"
        );

        Ok(QueryResult { query_id, columns, rows, execution_time_ms })
    }

    /// Read the first `limit` rows of `table`.
    pub async fn sample_rows(
        session: Arc<dyn EngineSession>,
        executor: &EngineExecutor,
        table: &str,
        limit: usize,
    ) -> Result<QueryResult, CubistError> {
        Self::execute(session, executor, &Self::sample_query(table, limit)).await
    }

    /// DAX for the first `limit` rows of `table`.
    pub fn sample_query(table: &str, limit: usize) -> String {
        format!("EVALUATE TOPN({}, {})", limit, quote_table(table))
    }
}

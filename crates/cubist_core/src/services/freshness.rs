//! Freshness oracle.
//!
//! Asks the engine when a model last changed. The answer only advises the
//! cache, so every failure resolves to an unknown marker instead of an error.

use std::sync::Arc;

use crate::engine::{EngineSession, MetadataFilter, MetadataRow, SystemView};
use crate::models::FreshnessMarker;
use crate::services::executor::EngineExecutor;

const SCHEMA_UPDATE: &str = "LAST_SCHEMA_UPDATE";
const DATA_UPDATE: &str = "LAST_DATA_UPDATE";

/// Reads the current freshness marker of a model.
#[derive(Debug, Clone)]
pub struct FreshnessOracle {
    executor: EngineExecutor,
}

impl FreshnessOracle {
    pub fn new(executor: EngineExecutor) -> Self {
        Self { executor }
    }

    /// Latest schema or data update across the model's cubes, or `None`
    /// when the engine cannot say.
    pub async fn current_marker(&self, session: Arc<dyn EngineSession>) -> FreshnessMarker {
        let rows = self
            .executor
            .with(session, |s| s.metadata_query(SystemView::Cubes, &MetadataFilter::none()))
            .await;

        match rows {
            Ok(rows) => {
                let marker = latest_update(&rows);
                if marker.is_none() {
                    tracing::debug!("Engine reported no update timestamps");
                }
                marker
            }
            Err(e) => {
                tracing::warn!(error = %e, "Freshness marker unavailable");
                None
            }
        }
    }
}

/// Maximum of the schema and data update timestamps found in `rows`.
pub fn latest_update(rows: &[MetadataRow]) -> FreshnessMarker {
    rows.iter()
        .flat_map(|row| [row.get_timestamp(SCHEMA_UPDATE), row.get_timestamp(DATA_UPDATE)])
        .flatten()
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn row(value: serde_json::Value) -> MetadataRow {
        match value {
            serde_json::Value::Object(map) => MetadataRow::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_latest_update_takes_max_across_columns_and_rows() {
        let rows = vec![
            row(json!({"LAST_SCHEMA_UPDATE": "2024-01-01T00:00:00", "LAST_DATA_UPDATE": "2024-01-03T00:00:00"})),
            row(json!({"LAST_SCHEMA_UPDATE": "2024-01-02T00:00:00", "LAST_DATA_UPDATE": ""})),
        ];
        assert_eq!(latest_update(&rows), Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_no_rows_or_unparseable_values_are_unknown() {
        assert_eq!(latest_update(&[]), None);
        let rows = vec![row(json!({"LAST_SCHEMA_UPDATE": "yesterday"}))];
        assert_eq!(latest_update(&rows), None);
    }

    #[tokio::test]
    async fn test_marker_follows_engine_updates() {
        let engine = FakeEngine::sales_model();
        let oracle = FreshnessOracle::new(EngineExecutor::new(1));

        let first = oracle.current_marker(FakeEngine::open(&engine)).await;
        assert!(first.is_some());

        let later = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
        engine.set_last_update(Some(later));
        assert_eq!(oracle.current_marker(FakeEngine::open(&engine)).await, Some(later));
    }

    #[tokio::test]
    async fn test_query_failure_resolves_to_unknown() {
        let engine = FakeEngine::sales_model();
        engine.fail_view(SystemView::Cubes);
        let oracle = FreshnessOracle::new(EngineExecutor::new(1));

        assert_eq!(oracle.current_marker(FakeEngine::open(&engine)).await, None);
    }
}

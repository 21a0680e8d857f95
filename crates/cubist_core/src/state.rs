//! Gateway state.
//!
//! Owns the worker pool, the session pool and the metadata cache, and exposes
//! the four operations the routing layer calls. The engine session factory is
//! injected once at construction.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::engine::{EngineSession, EngineSessionFactory};
use crate::error::CubistError;
use crate::models::{
    ConnectionDescriptor, ConnectionParams, PoolStatus, QueryResult, TableSchema, TableSummary,
};
use crate::services::{
    ConnectionPool, EngineExecutor, FreshnessOracle, MetadataCache, ModelMetadataSource,
    QueryService, SchemaService, SessionMetadataSource,
};

/// Central gateway state.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct CubistState {
    settings: Settings,
    executor: EngineExecutor,
    pool: ConnectionPool,
    cache: MetadataCache,
    oracle: FreshnessOracle,
}

impl CubistState {
    /// Create state using wall-clock time.
    pub fn new(settings: Settings, factory: Arc<dyn EngineSessionFactory>) -> Self {
        Self::with_clock(settings, factory, Arc::new(SystemClock))
    }

    /// Create state reading settings from the process environment.
    pub fn from_env(factory: Arc<dyn EngineSessionFactory>) -> Result<Self, CubistError> {
        Ok(Self::new(Settings::from_env()?, factory))
    }

    /// Create state with a custom time source for pool TTL bookkeeping.
    pub fn with_clock(
        settings: Settings,
        factory: Arc<dyn EngineSessionFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let executor = EngineExecutor::new(settings.engine_workers);
        let pool =
            ConnectionPool::with_clock(factory, executor.clone(), settings.connection_ttl(), clock);
        let oracle = FreshnessOracle::new(executor.clone());

        tracing::info!(
            engine_workers = executor.workers(),
            ttl_secs = settings.connection_ttl_secs,
            "CubistState initialized"
        );

        Self { settings, executor, pool, cache: MetadataCache::new(), oracle }
    }

    /// Resolve request arguments into a descriptor, applying default settings.
    pub fn resolve_descriptor(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<ConnectionDescriptor, CubistError> {
        ConnectionParams::from_arguments(arguments, &self.settings)
    }

    /// List the model's tables, served from cache while the model is unchanged.
    pub async fn list_tables(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<TableSummary>, CubistError> {
        let session = self.pool.get_or_create(descriptor).await?;
        let marker = self.oracle.current_marker(session.clone()).await;
        let key = descriptor.identity.key();
        let executor = &self.executor;

        self.cache
            .get_tables(&key, marker, move || async move {
                SchemaService::discover_tables(metadata_source(session), executor).await
            })
            .await
    }

    /// Describe one table, served from cache while the model is unchanged.
    pub async fn get_table_schema(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &str,
    ) -> Result<TableSchema, CubistError> {
        let table = require_table(table)?;
        let session = self.pool.get_or_create(descriptor).await?;
        let marker = self.oracle.current_marker(session.clone()).await;
        let key = descriptor.identity.key();
        let executor = &self.executor;

        self.cache
            .get_table_schema(&key, table, marker, move || async move {
                SchemaService::get_table_schema(metadata_source(session), executor, table).await
            })
            .await
    }

    /// Run a DAX query. Never cached.
    pub async fn execute_query(
        &self,
        descriptor: &ConnectionDescriptor,
        text: &str,
    ) -> Result<QueryResult, CubistError> {
        let session = self.pool.get_or_create(descriptor).await?;
        QueryService::execute(session, &self.executor, text).await
    }

    /// Read the first rows of a table; `limit` defaults to the configured
    /// sample size.
    pub async fn get_sample_rows(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &str,
        limit: Option<usize>,
    ) -> Result<QueryResult, CubistError> {
        let table = require_table(table)?;
        let limit = limit.filter(|n| *n > 0).unwrap_or(self.settings.sample_rows);
        let session = self.pool.get_or_create(descriptor).await?;
        QueryService::sample_rows(session, &self.executor, table, limit).await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &EngineExecutor {
        &self.executor
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Snapshot of the session pool.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}

impl std::fmt::Debug for CubistState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubistState")
            .field("settings", &self.settings)
            .field("executor", &self.executor)
            .field("pool", &self.pool)
            .field("cache", &self.cache)
            .finish()
    }
}

fn metadata_source(session: Arc<dyn EngineSession>) -> Arc<dyn ModelMetadataSource> {
    Arc::new(SessionMetadataSource::new(session))
}

fn require_table(table: &str) -> Result<&str, CubistError> {
    let table = table.trim();
    if table.is_empty() {
        return Err(CubistError::query("Table name is required"));
    }
    Ok(table)
}

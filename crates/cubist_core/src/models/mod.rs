//! Data models for Cubist.
//!
//! This module contains all core data structures:
//! - `connection` - ConnectionIdentity, ConnectionDescriptor, PoolStatus
//! - `query` - QueryRows, QueryResult
//! - `schema` - Table summaries, relationship views, table schemas, cache entries

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionDescriptor, ConnectionIdentity, ConnectionParams, PoolStatus};
pub use query::{QueryResult, QueryRows};
pub use schema::{
    ColumnDataType, ColumnDescription, ColumnDetail, FreshnessMarker, MeasureInfo,
    ModelCacheEntry, RawColumn, RawRelationship, RawTable, RelationshipView, SchemaCacheEntry,
    TableSchema, TableSummary, NO_DESCRIPTION,
};

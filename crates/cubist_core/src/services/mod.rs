//! Backend services for the Cubist gateway.
//!
//! This module contains all service layer abstractions:
//! - `executor` - Bounded worker pool for blocking engine calls
//! - `connection` - Engine session pooling keyed by connection identity
//! - `freshness` - Model change markers read from the engine
//! - `cache` - Metadata cache validated against freshness markers
//! - `metadata` - Catalog reads, batched and per table
//! - `relationship` - Relationship resolution with per-table fallback
//! - `schema` - Table discovery and schema introspection
//! - `query` - DAX query execution

pub mod cache;
pub mod connection;
pub mod executor;
pub mod freshness;
pub mod metadata;
pub mod query;
pub mod relationship;
pub mod schema;

pub use cache::{is_fresh, MetadataCache};
pub use connection::ConnectionPool;
pub use executor::EngineExecutor;
pub use freshness::FreshnessOracle;
pub use metadata::{ModelMetadataSource, SessionMetadataSource};
pub use query::QueryService;
pub use relationship::{format_cardinality, format_cross_filter, resolve_all};
pub use schema::SchemaService;

//! Core of the Cubist tabular-model gateway.
//!
//! This crate sits between a routing layer and a remote analytical engine:
//!
//! - **error**: Error taxonomy with user-facing hints
//! - **config**: Settings read from the environment
//! - **engine**: Interface to the external engine session client
//! - **models**: Connection identities, table metadata, query results
//! - **services**: Session pool, freshness oracle, metadata cache, discovery
//! - **state**: The gateway operations wired together
//! - **logging**: Structured logging setup

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use engine::{EngineSession, EngineSessionFactory, MetadataFilter, MetadataRow, SystemView};
pub use error::{CubistError, ErrorInfo};
pub use models::{
    ColumnDataType, ColumnDetail, ConnectionDescriptor, ConnectionIdentity, FreshnessMarker,
    MeasureInfo, PoolStatus, QueryResult, QueryRows, RelationshipView, TableSchema, TableSummary,
};
pub use services::{ConnectionPool, EngineExecutor, MetadataCache, QueryService, SchemaService};
pub use state::CubistState;

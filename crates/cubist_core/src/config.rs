//! Process-wide settings read from the environment.
//!
//! Identity fields act as defaults for requests that omit them. Numeric knobs
//! size the connection pool TTL and the engine worker pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CubistError;

/// Default idle time-to-live for pooled sessions.
pub const DEFAULT_CONNECTION_TTL_SECS: u64 = 300;

/// Default number of concurrent engine calls.
pub const DEFAULT_ENGINE_WORKERS: usize = 4;

/// Default number of rows returned by sampling.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Runtime settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// `DEFAULT_XMLA_ENDPOINT`
    pub default_endpoint: Option<String>,
    /// `DEFAULT_INITIAL_CATALOG`
    pub default_catalog: Option<String>,
    /// `DEFAULT_TENANT_ID`
    pub default_tenant_id: Option<String>,
    /// `DEFAULT_CLIENT_ID`
    pub default_client_id: Option<String>,
    /// `DEFAULT_CLIENT_SECRET`
    #[serde(skip_serializing)]
    pub default_client_secret: Option<String>,
    /// `CONNECTION_TTL_SECONDS`
    pub connection_ttl_secs: u64,
    /// `ENGINE_WORKERS`
    pub engine_workers: usize,
    /// `SAMPLE_ROWS`
    pub sample_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_endpoint: None,
            default_catalog: None,
            default_tenant_id: None,
            default_client_id: None,
            default_client_secret: None,
            connection_ttl_secs: DEFAULT_CONNECTION_TTL_SECS,
            engine_workers: DEFAULT_ENGINE_WORKERS,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, CubistError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CubistError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let settings = Self {
            default_endpoint: text("DEFAULT_XMLA_ENDPOINT"),
            default_catalog: text("DEFAULT_INITIAL_CATALOG"),
            default_tenant_id: text("DEFAULT_TENANT_ID"),
            default_client_id: text("DEFAULT_CLIENT_ID"),
            default_client_secret: text("DEFAULT_CLIENT_SECRET"),
            connection_ttl_secs: parse_positive(
                "CONNECTION_TTL_SECONDS",
                text("CONNECTION_TTL_SECONDS"),
                DEFAULT_CONNECTION_TTL_SECS,
            )?,
            engine_workers: parse_positive(
                "ENGINE_WORKERS",
                text("ENGINE_WORKERS"),
                DEFAULT_ENGINE_WORKERS,
            )?,
            sample_rows: parse_positive("SAMPLE_ROWS", text("SAMPLE_ROWS"), DEFAULT_SAMPLE_ROWS)?,
        };

        tracing::debug!(
            ttl_secs = settings.connection_ttl_secs,
            engine_workers = settings.engine_workers,
            has_default_endpoint = settings.default_endpoint.is_some(),
            "Settings loaded"
        );

        Ok(settings)
    }

    /// Idle time-to-live for pooled sessions.
    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("default_endpoint", &self.default_endpoint)
            .field("default_catalog", &self.default_catalog)
            .field("default_tenant_id", &self.default_tenant_id)
            .field("default_client_id", &self.default_client_id)
            .field("default_client_secret", &self.default_client_secret.as_ref().map(|_| "<redacted>"))
            .field("connection_ttl_secs", &self.connection_ttl_secs)
            .field("engine_workers", &self.engine_workers)
            .field("sample_rows", &self.sample_rows)
            .finish()
    }
}

fn parse_positive<T>(key: &str, raw: Option<String>, default: T) -> Result<T, CubistError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(CubistError::config(format!("{key} must be a positive integer, got '{raw}'"))),
    }
}

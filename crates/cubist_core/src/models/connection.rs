//! Connection identity, descriptor and pool status models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::CubistError;

/// Argument names accepted for the XMLA endpoint, in priority order.
const ENDPOINT_ALIASES: &[&str] = &["xmla_endpoint", "server", "data_source", "workspace_connection"];

/// Argument names accepted for the initial catalog, in priority order.
const CATALOG_ALIASES: &[&str] = &["initial_catalog", "database", "catalog", "dataset", "model"];

/// Which remote model a session targets.
///
/// Credentials are not part of the identity, so the derived
/// [`key`](Self::key) is safe to log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    /// XMLA endpoint (e.g. `powerbi://api.powerbi.com/v1.0/myorg/Sales`).
    pub endpoint: String,
    /// Dataset / initial catalog name.
    pub catalog: String,
    /// Azure AD tenant.
    pub tenant: Option<String>,
    /// Service principal application id.
    pub client_id: Option<String>,
}

impl ConnectionIdentity {
    /// Create an identity without tenant or client fields.
    pub fn new(endpoint: impl Into<String>, catalog: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), catalog: catalog.into(), tenant: None, client_id: None }
    }

    /// Set the tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Set the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Pool and cache key: `endpoint|catalog|tenant|client`, absent fields empty.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.endpoint,
            self.catalog,
            self.tenant.as_deref().unwrap_or(""),
            self.client_id.as_deref().unwrap_or("")
        )
    }
}

/// Everything the engine session factory needs to open a session.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    /// Target model.
    pub identity: ConnectionIdentity,
    /// Service principal secret. Never logged.
    pub client_secret: Option<String>,
}

impl ConnectionDescriptor {
    /// Create a descriptor.
    pub fn new(identity: ConnectionIdentity, client_secret: Option<String>) -> Self {
        Self { identity, client_secret }
    }

    /// Render the MSOLAP connection string handed to the native client.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            "Provider=MSOLAP".to_string(),
            format!("Data Source={}", self.identity.endpoint),
            format!("Initial Catalog={}", self.identity.catalog),
        ];
        if let (Some(client_id), Some(tenant)) = (&self.identity.client_id, &self.identity.tenant) {
            parts.push(format!("User ID=app:{client_id}@{tenant}"));
        }
        if let Some(secret) = &self.client_secret {
            parts.push(format!("Password={secret}"));
        }
        let mut rendered = parts.join(";");
        rendered.push(';');
        rendered
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("identity", &self.identity)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolves a descriptor from loosely-typed request arguments.
pub struct ConnectionParams;

impl ConnectionParams {
    /// Build a descriptor from request arguments, falling back to `settings`
    /// defaults for every absent field.
    ///
    /// Endpoint and catalog accept several aliases (`server`, `dataset`, ...).
    pub fn from_arguments(
        arguments: &Map<String, Value>,
        settings: &Settings,
    ) -> Result<ConnectionDescriptor, CubistError> {
        let endpoint =
            first_present(arguments, ENDPOINT_ALIASES).or_else(|| settings.default_endpoint.clone());
        let catalog =
            first_present(arguments, CATALOG_ALIASES).or_else(|| settings.default_catalog.clone());
        let tenant =
            first_present(arguments, &["tenant_id"]).or_else(|| settings.default_tenant_id.clone());
        let client_id =
            first_present(arguments, &["client_id"]).or_else(|| settings.default_client_id.clone());
        let client_secret = first_present(arguments, &["client_secret"])
            .or_else(|| settings.default_client_secret.clone());

        match (endpoint, catalog) {
            (Some(endpoint), Some(catalog)) => Ok(ConnectionDescriptor {
                identity: ConnectionIdentity { endpoint, catalog, tenant, client_id },
                client_secret,
            }),
            (endpoint, catalog) => {
                let mut missing = Vec::new();
                if endpoint.is_none() {
                    missing.push("xmla_endpoint");
                }
                if catalog.is_none() {
                    missing.push("initial_catalog");
                }
                Err(CubistError::missing_parameters(missing))
            }
        }
    }
}

/// First non-empty string among `names`.
fn first_present(arguments: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| arguments.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Snapshot of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Sessions currently held by the pool.
    pub sessions: usize,
    /// Keys with a creation in flight or waiters queued.
    pub pending: usize,
    /// Idle time-to-live in seconds.
    pub ttl_secs: i64,
}

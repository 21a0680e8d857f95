//! Error types for Cubist.
//!
//! Every failure either surfaces once to the immediate caller through
//! [`CubistError`] or is resolved to a documented default by the service that
//! observed it (freshness lookups, batched metadata fetches).

use thiserror::Error;

/// Main error type for Cubist.
#[derive(Debug, Error)]
pub enum CubistError {
    /// Engine unreachable or the session could not be opened.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The engine rejected the supplied credentials.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// The engine rejected a query or metadata request.
    #[error("{message}")]
    Query {
        /// Engine error message.
        message: String,
        /// Additional detail from the engine.
        detail: Option<String>,
        /// Engine error code, when one is reported.
        code: Option<String>,
    },

    /// A connection identity could not be resolved from arguments and defaults.
    #[error("Missing required connection parameters: {}", .fields.join(", "))]
    MissingParameter {
        /// Names of the missing fields.
        fields: Vec<&'static str>,
    },

    /// Invalid configuration value.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CubistError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Check tenant, client id and client secret".to_string()),
        }
    }

    /// Create a new query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), detail: None, code: None }
    }

    /// Create a new query error with engine details.
    pub fn query_with_details(
        message: impl Into<String>,
        detail: Option<String>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, code }
    }

    /// Create a missing-parameter error.
    pub fn missing_parameters(fields: Vec<&'static str>) -> Self {
        Self::MissingParameter { fields }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this error came from opening a session.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Authentication { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Query { .. } => "Query",
            Self::MissingParameter { .. } => "Parameter",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the XMLA endpoint is reachable"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Query { .. } => None,
            Self::MissingParameter { .. } => {
                Some("Provide xmla_endpoint/server and initial_catalog/database/dataset")
            }
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the engine error code (if applicable).
    pub fn engine_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Self::Connection { source: Some(source), .. }
            | Self::Internal { source: Some(source), .. } => Some(source.to_string()),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for "Show Details" expansion.
    pub technical_detail: Option<String>,
}

/// Convert from a worker-pool join failure.
impl From<tokio::task::JoinError> for CubistError {
    fn from(err: tokio::task::JoinError) -> Self {
        let message = if err.is_panic() {
            "Engine worker panicked".to_string()
        } else {
            "Engine worker was cancelled".to_string()
        };
        CubistError::Internal { message, source: Some(Box::new(err)) }
    }
}

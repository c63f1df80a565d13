//! Error types for caldav-mcp.

use thiserror::Error;

/// Errors that can occur in gateway, store and codec operations.
#[derive(Error, Debug)]
pub enum CalDavError {
    #[error("Not connected to CalDAV server")]
    NotConnected,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("CalDAV store error: {0}")]
    Store(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CalDavError {
    /// Stable classification tag, reported as `exception_type` in error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            CalDavError::NotConnected => "NotConnected",
            CalDavError::Authentication(_) => "Authentication",
            CalDavError::NotFound(_) => "NotFound",
            CalDavError::InvalidParameters(_) => "InvalidParameters",
            CalDavError::Unsupported(_) => "Unsupported",
            CalDavError::Store(_) => "Store",
            CalDavError::IcsParse(_) => "IcsParse",
            CalDavError::Config(_) => "Config",
            CalDavError::Io(_) => "Io",
            CalDavError::Serialization(_) => "Serialization",
        }
    }
}

impl From<serde_json::Error> for CalDavError {
    fn from(e: serde_json::Error) -> Self {
        CalDavError::Serialization(e.to_string())
    }
}

/// Result type alias for caldav-mcp operations.
pub type CalDavResult<T> = Result<T, CalDavError>;

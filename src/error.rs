//! Error handling for the windrose telemetry service.

/// A specialized `Result` type for windrose operations.
pub type Result<T> = std::result::Result<T, StationError>;

/// The main error type for station link and web operations.
///
/// None of these are fatal to the pipeline: every failure mode degrades to
/// serving the last known good state.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request to the device failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Real-time broadcast lease negotiation failed
    #[error("Lease error: {0}")]
    Lease(String),

    /// Device payload could not be parsed
    #[error("Failed to parse device payload: {0}")]
    Parse(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StationError {
    /// Create a new discovery error
    pub fn discovery_error(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a new lease error
    pub fn lease_error(msg: impl Into<String>) -> Self {
        Self::Lease(msg.into())
    }

    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

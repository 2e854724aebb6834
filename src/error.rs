//! Gateway error types.
//!
//! Errors split into two lifetimes:
//!
//! - **Request-scoped**: everything produced while transforming or forwarding a
//!   single request. These are converted into a plain-text HTTP error response
//!   by the handler and never escape the request.
//! - **Fatal**: configuration, certificate, and listener failures. These
//!   propagate out of `Gateway::run` and terminate the process.

use thiserror::Error;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request body is not a well-formed JSON object.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Processed payload could not be re-encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// A field required by the active pipeline stage is absent or mistyped.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Preprocess entry point missing, raised, or returned a bad value.
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Route entry point missing, raised, or returned an invalid decision.
    #[error("Routing error: {0}")]
    Routing(String),

    /// Upstream call failed at the transport level (connect, TLS, timeout).
    #[error("Upstream unreachable: {0}")]
    Upstream(String),

    /// Script source could not be loaded or evaluated at startup.
    #[error("Script error: {0}")]
    Script(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Listener or connection-serving error.
    #[error("Server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status this error maps to when reported to the caller.
    ///
    /// Only `Upstream` distinguishes itself (502); every other
    /// request-scoped error is an internal failure of the gateway pipeline.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Upstream(_) => 502,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::Config(err.to_string())
    }
}

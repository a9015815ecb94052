//! Error types for fabric controller calls.

use thiserror::Error;

/// Result type alias for fabric controller calls.
pub type FabricResult<T> = Result<T, FabricError>;

/// Errors returned by the fabric controller client.
#[derive(Debug, Error)]
pub enum FabricError {
    /// No device is registered for the switch IP.
    #[error("No fabric device registered for switch {switch_ip}")]
    SwitchNotFound {
        /// The switch management IP.
        switch_ip: String,
    },

    /// The controller stayed unreachable for the whole retry budget.
    #[error("Fabric controller unreachable at {url} after {attempts} attempts: {message}")]
    ConnectionFailed {
        /// The request URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        message: String,
    },

    /// The controller answered with a non-success status.
    #[error("Fabric controller returned {status} for {url}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The request URL.
        url: String,
        /// Response body.
        body: String,
    },

    /// The controller response could not be decoded.
    #[error("Invalid fabric controller response from {url}: {message}")]
    Decode {
        /// The request URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// The client was misconfigured or asked something it cannot send.
    #[error("Invalid fabric request: {message}")]
    InvalidRequest {
        /// Error message.
        message: String,
    },
}

impl FabricError {
    /// Creates a switch not found error.
    pub fn switch_not_found(switch_ip: impl Into<String>) -> Self {
        Self::SwitchNotFound {
            switch_ip: switch_ip.into(),
        }
    }

    /// Creates a connection failed error.
    pub fn connection_failed(url: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            url: url.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FabricError::ConnectionFailed { .. })
    }
}

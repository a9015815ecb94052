//! Error types for fabric synchronization.

use fabric_client::FabricError;
use fabric_store::StoreError;
use thiserror::Error;

use crate::orchestrator::OrchestratorError;

/// Result type alias for fabric synchronization.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the reconciler, the router coordinator and startup.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration is malformed. Fatal at startup.
    #[error("Invalid configuration for {field}: {message}")]
    Config {
        /// The offending key or file.
        field: String,
        /// Error message.
        message: String,
    },

    /// No free id is left in a pool.
    #[error("No free id left in pool {pool} ({scope})")]
    ResourceExhausted {
        /// The pool name.
        pool: String,
        /// "global" or the switch IP of a scoped pool.
        scope: String,
    },

    /// A concurrent allocation claimed the same id.
    #[error("Allocation conflict in pool {pool}: {message}")]
    Conflict {
        /// The pool name.
        pool: String,
        /// Error message.
        message: String,
    },

    /// The fabric controller has no device for the switch IP.
    #[error("Switch {switch_ip} is not registered on the fabric controller")]
    SwitchNotFound {
        /// The switch management IP.
        switch_ip: String,
    },

    /// No switch connected to the host declares a physical network.
    #[error("No physical network configured for host {host_id} (connected switches: {switches:?})")]
    PhysnetNotConfigured {
        /// The binding host.
        host_id: String,
        /// Switches found for the host.
        switches: Vec<String>,
    },

    /// The orchestrator did not hand out a dynamic VLAN segment.
    #[error("No dynamic VLAN segment allocated for network {network_id} on physnet {physnet}")]
    NoDynamicSegmentAllocated {
        /// The overlay network.
        network_id: String,
        /// The physical network asked for.
        physnet: String,
    },

    /// The fabric controller stayed unreachable for the whole retry budget.
    #[error("Fabric controller unreachable at {url} after {attempts} attempts: {message}")]
    ConnectionFailed {
        /// The request URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        message: String,
    },

    /// A network may carry a single subnet.
    #[error("Network {network_id} already has a subnet")]
    SubnetLimit {
        /// The network that already has a subnet.
        network_id: String,
    },

    /// A provider segment request was rejected.
    #[error("Invalid segment: {message}")]
    InvalidSegment {
        /// Error message.
        message: String,
    },

    /// Any other fabric controller failure.
    #[error(transparent)]
    Fabric(FabricError),

    /// The orchestrator could not answer.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// The allocation or binding store failed.
    #[error(transparent)]
    Database(StoreError),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid segment error.
    pub fn invalid_segment(message: impl Into<String>) -> Self {
        Self::InvalidSegment {
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::ConnectionFailed { .. } => true,
            Self::Database(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ResourceExhausted { pool, scope } => Self::ResourceExhausted { pool, scope },
            StoreError::Conflict { pool, message } => Self::Conflict { pool, message },
            other => Self::Database(other),
        }
    }
}

impl From<FabricError> for SyncError {
    fn from(e: FabricError) -> Self {
        match e {
            FabricError::SwitchNotFound { switch_ip } => Self::SwitchNotFound { switch_ip },
            FabricError::ConnectionFailed {
                url,
                attempts,
                message,
            } => Self::ConnectionFailed {
                url,
                attempts,
                message,
            },
            other => Self::Fabric(other),
        }
    }
}

//! Crate-level error taxonomy
//!
//! Every per-message or per-connection failure maps onto one of these
//! variants. None of them is fatal to the owning component; they surface as
//! log lines at the point of occurrence.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core_crypto::CryptoError;
use crate::core_router::FrameError;
use crate::core_store::StoreError;
use crate::core_topology::TopologyError;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// connect/bind/accept/send failures
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed, oversized or schema-violating frame
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Envelope addressed to a different hop
    #[error("Unauthorized: {0}")]
    Authorization(String),

    /// No known route to the destination
    #[error("No route to {0}")]
    NoRoute(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation attempted on a stopped component
    #[error("Component stopped")]
    Stopped,
}

impl RelayError {
    pub fn connection(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        RelayError::Connection(format!("{}: {}", context, err))
    }
}

impl From<FrameError> for RelayError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(err) => RelayError::Connection(err.to_string()),
            other => RelayError::ProtocolDecode(other.to_string()),
        }
    }
}

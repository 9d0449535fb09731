//! Session and manager error taxonomy.

use skiff_crypto::KeyStoreError;
use skiff_transport::TransportError;
use skiff_wire::WireError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal session failures.
///
/// Per-call receive timeouts are recovered locally by the state machines;
/// everything here aborts the session, releases its resources, and records
/// the failure in the permissions registry. A failed session never takes
/// the process down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wire shape violation
    #[error("malformed message: {0}")]
    Malformed(#[from] WireError),

    /// Correctly-shaped but contextually-illegal message
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Session deadline exceeded before the handshake completed
    #[error("handshake deadline exceeded")]
    HandshakeTimeout,

    /// Session deadline exceeded mid-transfer
    #[error("transfer deadline exceeded")]
    TransferTimeout,

    /// Context terminated; sessions exit silently on this
    #[error("transport closed")]
    TransportClosed,

    /// Disk read or write failure
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => Self::TransportClosed,
            TransportError::Io(io) => Self::Io(io),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Failures raised by the manager before a state machine starts.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The path handed to `publish` does not exist
    #[error("path missing: {0}")]
    PathMissing(PathBuf),

    /// Expected key file absent or unreadable
    #[error(transparent)]
    Key(#[from] KeyStoreError),

    /// Socket construction failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

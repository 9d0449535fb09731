//! Transport error types.

use std::io;
use thiserror::Error;

/// Failures establishing or using a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket failure
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),

    /// Noise handshake or packet authentication failure
    #[error("crypto: {0}")]
    Crypto(#[from] skiff_crypto::CryptoError),

    /// The server presented a static key other than the expected one
    #[error("server key mismatch")]
    ServerKeyMismatch,

    /// A decrypted packet did not parse as a multipart message
    #[error("malformed packet")]
    MalformedPacket,

    /// The context was shut down, the peer vanished, or the connection
    /// closed before the operation completed
    #[error("transport closed")]
    Closed,
}

/// Outcome of a bounded-wait receive.
#[derive(Debug, Error)]
pub enum RecvError {
    /// Nothing arrived within the wait; the caller should check its
    /// deadline and loop
    #[error("receive timed out")]
    TimedOut,

    /// The transport is gone; no further messages will arrive
    #[error("transport closed")]
    Closed,
}

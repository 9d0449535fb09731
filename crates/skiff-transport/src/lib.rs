//! # skiff transport
//!
//! The message-framed, curve-encrypted point-to-point transport the skiff
//! protocol runs over.
//!
//! A connection carries **packets**; each packet is one length-delimited
//! TCP frame whose plaintext is a multipart message (a sequence of byte
//! frames, each with its own length prefix). Every packet is sealed with a
//! `Noise_XX` channel established when the connection opens, so peers are
//! mutually authenticated and the client has verified the server's static
//! key before any protocol traffic flows.
//!
//! Guarantees the protocol layer relies on:
//! - per-peer FIFO ordering (TCP plus order-preserving channels)
//! - bounded buffering: every internal channel holds at most the configured
//!   high-water mark, so a slow peer exerts backpressure
//! - prompt termination: a [`Context`] shutdown surfaces as
//!   [`RecvError::Closed`] on the next receive
//!
//! Two socket shapes match the two session roles: a [`ServerSocket`]
//! accepts whitelisted peers and routes messages by [`PeerToken`]; a
//! [`ClientSocket`] holds a single authenticated connection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod context;
pub mod error;
pub mod framing;
pub mod server;

pub use client::{ClientConfig, ClientSocket};
pub use context::Context;
pub use error::{RecvError, TransportError};
pub use server::{PeerToken, ServerConfig, ServerSocket};

use bytes::Bytes;

/// One wire message: a non-empty sequence of byte frames.
pub type Multipart = Vec<Bytes>;

/// Upper bound on a single sealed packet.
pub const MAX_PACKET: usize = 1 << 20;

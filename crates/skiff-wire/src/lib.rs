//! # skiff wire grammar
//!
//! The message grammar shared by both ends of a skiff session.
//!
//! Every message on the wire is a sequence of byte frames. The first frame
//! is always a [`PacketTag`]; the remaining frames are tag-specific. This
//! crate provides:
//! - [`PacketTag`]: the closed tag enumeration and its ASCII wire bytes
//! - [`Message`]: the decoded message variants and the stateless codec
//! - Protocol constants shared by transmitter and receiver
//!
//! The codec is deliberately independent of any socket type: the transport
//! moves frames, this crate gives them meaning.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod message;

pub use error::WireError;
pub use message::{Message, PacketTag};

use std::time::Duration;

/// Bytes requested per `FETCH`
pub const CHUNK_SIZE: usize = 250_000;

/// Maximum outstanding `FETCH` requests per file (the credit window)
pub const PIPELINE: usize = 10;

/// Default TCP port for a published directory
pub const DEFAULT_PORT: u16 = 6000;

/// Wall-clock deadline for a whole session, handshake included
pub const SESSION_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Bounded wait for a single receive call
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

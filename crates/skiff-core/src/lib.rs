//! # skiff core
//!
//! The session layer of skiff: per-peer handshake, the transmitter and
//! receiver state machines, the credit-based pipelining discipline, the
//! process-wide permissions registry, and the [`Manager`] that wires
//! sessions to the transport.
//!
//! A session is the lifetime of one transmitter-receiver connection, from
//! `WELCOME` to the terminal `DONE` (or an error). Each session runs on its
//! own task; the only shared objects are the transport context and the
//! registry. All waits are bounded (1 s) so every session can check its
//! 30-minute deadline and observe cancellation between calls.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod job;
pub mod manager;
pub mod permissions;
pub mod receiver;
pub mod transmitter;
pub mod window;

pub use error::{ManagerError, SessionError};
pub use job::{FileEntry, TransferJob};
pub use manager::{Manager, SessionHandle};
pub use permissions::{Permission, PermissionRecord, Registry};
pub use receiver::{run_receiver, ReceiverConfig};
pub use transmitter::{run_transmitter, FileServer, ServeStep, TransmitterConfig, UpdatesPredicate};
pub use window::ChunkWindow;

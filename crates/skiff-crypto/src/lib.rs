//! # skiff crypto
//!
//! Curve-based authentication for skiff connections.
//!
//! The transport runs every connection through a `Noise_XX` handshake on
//! Curve25519. The transmitter side is the Noise responder (server role),
//! the receiver the initiator (client role); after the third message both
//! ends hold a [`SecureChannel`] and the client has verified the server's
//! static key against the key it was invited with.
//!
//! Long-term key material lives on disk under the installation root in
//! `public_keys/` and `private_keys/`, one hex-encoded file per role. The
//! [`KeyStore`] generates it once and loads it for every session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod keystore;
pub mod noise;

pub use keystore::{KeyRole, KeyStore, KeyStoreError};
pub use noise::{CryptoError, Handshake, Keypair, Role, SecureChannel};

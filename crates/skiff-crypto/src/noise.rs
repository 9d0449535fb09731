//! `Noise_XX` handshake and the post-handshake encrypted channel.
//!
//! Pattern: `XX` (mutual authentication), DH `25519`, cipher `ChaChaPoly`,
//! hash `BLAKE2s`. Three messages:
//!
//! ```text
//! 1: client -> server: e
//! 2: server -> client: e, ee, s, es
//! 3: client -> server: s, se
//! ```
//!
//! The server's static key travels in message 2, so the client can compare
//! it against the public key it was given out of band before sending
//! anything of substance.

use snow::{Builder, HandshakeState, TransportState};
use thiserror::Error;
use zeroize::Zeroize;

/// Noise pattern used for every skiff connection.
const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// Buffer size for handshake messages; generous over the XX maximum.
const MAX_HANDSHAKE_MSG: usize = 256;

/// AEAD tag appended to every sealed payload.
const TAG_LEN: usize = 16;

/// Errors from handshake or channel operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Underlying snow failure (bad MAC, wrong order, corrupt message)
    #[error("noise failure: {0}")]
    Noise(String),

    /// Operation requires a finished handshake
    #[error("handshake not complete")]
    HandshakeIncomplete,

    /// Sealed message shorter than the authentication tag
    #[error("sealed message truncated")]
    Truncated,
}

impl From<snow::Error> for CryptoError {
    fn from(e: snow::Error) -> Self {
        Self::Noise(e.to_string())
    }
}

/// Side of the handshake, matching the transport-layer socket roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Binds and responds; the transmitter side
    Server,
    /// Connects and initiates; the receiver side
    Client,
}

/// Long-term Curve25519 keypair identifying one installation role.
pub struct Keypair {
    secret: Vec<u8>,
    public: [u8; 32],
}

impl Keypair {
    /// Generate a fresh random keypair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Noise`] if the RNG or pattern setup fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let builder = Builder::new(pattern()?);
        let kp = builder.generate_keypair()?;
        let mut public = [0u8; 32];
        public.copy_from_slice(&kp.public);
        Ok(Self { secret: kp.private, public })
    }

    /// Rebuild a keypair from its 32 secret bytes, deriving the public half.
    #[must_use]
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let static_secret = x25519_dalek::StaticSecret::from(secret);
        let public = x25519_dalek::PublicKey::from(&static_secret).to_bytes();
        Self { secret: secret.to_vec(), public }
    }

    /// Public key bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Secret key bytes. Handle with care.
    #[must_use]
    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            public: self.public,
        }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(&self.public[..8]))
            .finish_non_exhaustive()
    }
}

fn pattern() -> Result<snow::params::NoiseParams, CryptoError> {
    NOISE_PATTERN
        .parse()
        .map_err(|e| CryptoError::Noise(format!("pattern parse: {e:?}")))
}

/// In-flight `Noise_XX` handshake for one connection.
pub struct Handshake {
    state: HandshakeState,
    role: Role,
}

impl Handshake {
    /// Start a handshake in the given role with the local static keypair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Noise`] if state construction fails.
    pub fn new(role: Role, local: &Keypair) -> Result<Self, CryptoError> {
        let builder = Builder::new(pattern()?).local_private_key(&local.secret)?;
        let state = match role {
            Role::Client => builder.build_initiator()?,
            Role::Server => builder.build_responder()?,
        };
        Ok(Self { state, role })
    }

    /// Role this handshake was started in.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Produce the next outbound handshake message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Noise`] when called out of turn for the role.
    pub fn write_message(&mut self) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; MAX_HANDSHAKE_MSG];
        let n = self.state.write_message(&[], &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Consume an inbound handshake message.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Noise`] on decryption failure or a message
    /// arriving out of turn.
    pub fn read_message(&mut self, message: &[u8]) -> Result<(), CryptoError> {
        let mut buf = vec![0u8; MAX_HANDSHAKE_MSG];
        self.state.read_message(message, &mut buf)?;
        Ok(())
    }

    /// The peer's static public key, once it has arrived (message 2 for the
    /// client, message 3 for the server).
    #[must_use]
    pub fn remote_static(&self) -> Option<[u8; 32]> {
        self.state.get_remote_static().map(|key| {
            let mut out = [0u8; 32];
            out.copy_from_slice(key);
            out
        })
    }

    /// Whether all three messages have been exchanged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_handshake_finished()
    }

    /// Finish the handshake and produce the encrypted channel.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HandshakeIncomplete`] before message 3.
    pub fn into_channel(self) -> Result<SecureChannel, CryptoError> {
        if !self.state.is_handshake_finished() {
            return Err(CryptoError::HandshakeIncomplete);
        }
        Ok(SecureChannel {
            inner: self.state.into_transport_mode()?,
        })
    }
}

/// Bidirectional encrypted channel wrapping a whole framed packet per call.
pub struct SecureChannel {
    inner: TransportState,
}

impl SecureChannel {
    /// Encrypt and authenticate one packet.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Noise`] if encryption fails.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; plaintext.len() + TAG_LEN];
        let n = self.inner.write_message(plaintext, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Verify and decrypt one packet.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Truncated`] for packets shorter than the tag,
    /// [`CryptoError::Noise`] when authentication fails.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < TAG_LEN {
            return Err(CryptoError::Truncated);
        }
        let mut out = vec![0u8; sealed.len() - TAG_LEN];
        let n = self.inner.read_message(sealed, &mut out)?;
        out.truncate(n);
        Ok(out)
    }
}

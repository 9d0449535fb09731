//! On-disk key material.
//!
//! Two directories under the installation root, written once by `keygen`
//! and never mutated by the protocol:
//!
//! ```text
//! <root>/public_keys/tx.key          hex public key, transmitter role
//! <root>/public_keys/rx.key          hex public key, receiver role
//! <root>/private_keys/tx.key_secret  hex secret key, transmitter role
//! <root>/private_keys/rx.key_secret  hex secret key, receiver role
//! ```
//!
//! The receiver is additionally handed the transmitter's public key out of
//! band (the invitation); [`KeyStore::resolve_public_key`] accepts either a
//! path to a `.key` file or the raw hex blob itself.

use crate::noise::Keypair;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory of public key files under the root.
const PUBLIC_DIR: &str = "public_keys";

/// Directory of secret key files under the root.
const PRIVATE_DIR: &str = "private_keys";

/// Key-store failures.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// An expected key file does not exist
    #[error("key material missing: {0}")]
    Missing(PathBuf),

    /// A key file exists but does not hold a 32-byte hex key
    #[error("malformed key file: {0}")]
    Malformed(PathBuf),

    /// A raw key argument was not 64 hex characters
    #[error("malformed raw key")]
    MalformedRaw,

    /// Underlying filesystem failure
    #[error("key store i/o: {0}")]
    Io(#[from] io::Error),
}

/// The two installation roles keyed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Serves a published path; the Noise server
    Transmitter,
    /// Pulls into a destination; the Noise client
    Receiver,
}

impl KeyRole {
    /// Filename stem for this role's key files.
    #[must_use]
    pub const fn stem(self) -> &'static str {
        match self {
            Self::Transmitter => "tx",
            Self::Receiver => "rx",
        }
    }
}

/// Key material rooted at an installation directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    /// A store rooted at `root`. Nothing is touched until generate or load.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn public_path(&self, role: KeyRole) -> PathBuf {
        self.root.join(PUBLIC_DIR).join(format!("{}.key", role.stem()))
    }

    fn private_path(&self, role: KeyRole) -> PathBuf {
        self.root
            .join(PRIVATE_DIR)
            .join(format!("{}.key_secret", role.stem()))
    }

    /// Generate key material for both roles, skipping any role whose files
    /// already exist. Returns the roles actually generated.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Io`] on directory or file creation failure.
    pub fn generate(&self) -> Result<Vec<KeyRole>, KeyStoreError> {
        fs::create_dir_all(self.root.join(PUBLIC_DIR))?;
        fs::create_dir_all(self.root.join(PRIVATE_DIR))?;

        let mut created = Vec::new();
        for role in [KeyRole::Transmitter, KeyRole::Receiver] {
            if self.public_path(role).exists() && self.private_path(role).exists() {
                continue;
            }
            let keypair = Keypair::generate()
                .map_err(|e| io::Error::other(format!("keypair generation: {e}")))?;
            fs::write(self.public_path(role), hex::encode(keypair.public_key()))?;
            fs::write(self.private_path(role), hex::encode(keypair.secret_key()))?;
            created.push(role);
        }
        Ok(created)
    }

    /// Load the full keypair for a role from its secret file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Missing`] when the secret file is absent,
    /// [`KeyStoreError::Malformed`] when it is not a 32-byte hex key.
    pub fn load_keypair(&self, role: KeyRole) -> Result<Keypair, KeyStoreError> {
        let path = self.private_path(role);
        let secret = read_key_file(&path)?;
        Ok(Keypair::from_secret_bytes(secret))
    }

    /// Read a role's public key file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Missing`] when the file is absent,
    /// [`KeyStoreError::Malformed`] when it is not a 32-byte hex key.
    pub fn public_key(&self, role: KeyRole) -> Result<[u8; 32], KeyStoreError> {
        read_key_file(&self.public_path(role))
    }

    /// Resolve a server public key given either a path to a key file or the
    /// raw hex key itself. Paths win when they exist.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Malformed`] for an unreadable key file and
    /// [`KeyStoreError::MalformedRaw`] for a non-hex raw argument.
    pub fn resolve_public_key(arg: &str) -> Result<[u8; 32], KeyStoreError> {
        let path = Path::new(arg);
        if path.exists() {
            return read_key_file(path);
        }
        decode_hex_key(arg.trim()).ok_or(KeyStoreError::MalformedRaw)
    }

    /// Installation root this store reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn read_key_file(path: &Path) -> Result<[u8; 32], KeyStoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(KeyStoreError::Missing(path.to_path_buf()));
        }
        Err(e) => return Err(KeyStoreError::Io(e)),
    };
    decode_hex_key(text.trim()).ok_or_else(|| KeyStoreError::Malformed(path.to_path_buf()))
}

fn decode_hex_key(text: &str) -> Option<[u8; 32]> {
    let raw = hex::decode(text).ok()?;
    raw.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());

        let created = store.generate().unwrap();
        assert_eq!(created.len(), 2);

        for role in [KeyRole::Transmitter, KeyRole::Receiver] {
            let keypair = store.load_keypair(role).unwrap();
            assert_eq!(*keypair.public_key(), store.public_key(role).unwrap());
        }
    }

    #[test]
    fn test_generate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());

        store.generate().unwrap();
        let tx_before = store.public_key(KeyRole::Transmitter).unwrap();

        assert!(store.generate().unwrap().is_empty());
        assert_eq!(store.public_key(KeyRole::Transmitter).unwrap(), tx_before);
    }

    #[test]
    fn test_missing_key_material() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());

        assert!(matches!(
            store.load_keypair(KeyRole::Transmitter),
            Err(KeyStoreError::Missing(_))
        ));
        assert!(matches!(
            store.public_key(KeyRole::Receiver),
            Err(KeyStoreError::Missing(_))
        ));
    }

    #[test]
    fn test_malformed_key_file() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(PUBLIC_DIR)).unwrap();
        std::fs::write(dir.path().join(PUBLIC_DIR).join("tx.key"), "not-hex").unwrap();

        assert!(matches!(
            store.public_key(KeyRole::Transmitter),
            Err(KeyStoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_resolve_raw_hex_key() {
        let key = [7u8; 32];
        let resolved = KeyStore::resolve_public_key(&hex::encode(key)).unwrap();
        assert_eq!(resolved, key);
    }

    #[test]
    fn test_resolve_key_path() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());
        store.generate().unwrap();

        let path = store.public_path(KeyRole::Transmitter);
        let resolved = KeyStore::resolve_public_key(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved, store.public_key(KeyRole::Transmitter).unwrap());
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(matches!(
            KeyStore::resolve_public_key("definitely not a key"),
            Err(KeyStoreError::MalformedRaw)
        ));
    }
}

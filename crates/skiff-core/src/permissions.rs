//! Process-wide permission records.
//!
//! One record per session, written at the handshake transition and keyed by
//! the published (transmitter) or destination (receiver) path, then by the
//! remote peer's id. Sessions write a single record under a single key, so
//! writes never overlap, but readers run concurrently with them; every
//! access goes through the mutex. The lock is never held across I/O.

use skiff_wire::PacketTag;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What the remote peer may do with the recorded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Remote may only read from us (we are the transmitter's peer)
    ReadOnly,
    /// Remote may only write to us (we are the receiver's peer)
    WriteOnly,
}

/// Per-peer record under one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    /// Permission tag assigned at handshake
    pub permission: Permission,
    /// Last session status: `WELCOME` while live, `DONE` or `ERR` after
    pub status: PacketTag,
}

/// Shared registry of path -> peer -> record.
///
/// Cloning shares the underlying map; each session captures a clone.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<PathBuf, HashMap<Uuid, PermissionRecord>>>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer under a path at handshake success. Status starts at
    /// `WELCOME`.
    pub fn record(&self, path: &Path, peer: Uuid, permission: Permission) {
        let mut map = self.inner.lock().expect("registry poisoned");
        map.entry(path.to_path_buf()).or_default().insert(
            peer,
            PermissionRecord {
                permission,
                status: PacketTag::Welcome,
            },
        );
    }

    /// Update a recorded peer's session status. Unknown keys are ignored;
    /// a session that never finished its handshake has nothing to update.
    pub fn set_status(&self, path: &Path, peer: Uuid, status: PacketTag) {
        let mut map = self.inner.lock().expect("registry poisoned");
        if let Some(record) = map.get_mut(path).and_then(|peers| peers.get_mut(&peer)) {
            record.status = status;
        }
    }

    /// Look up one record.
    #[must_use]
    pub fn get(&self, path: &Path, peer: Uuid) -> Option<PermissionRecord> {
        let map = self.inner.lock().expect("registry poisoned");
        map.get(path).and_then(|peers| peers.get(&peer)).cloned()
    }

    /// Peers recorded under a path.
    #[must_use]
    pub fn peers_for(&self, path: &Path) -> Vec<Uuid> {
        let map = self.inner.lock().expect("registry poisoned");
        map.get(path)
            .map(|peers| peers.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let registry = Registry::new();
        let peer = Uuid::new_v4();
        let path = Path::new("/srv/published");

        registry.record(path, peer, Permission::WriteOnly);

        let record = registry.get(path, peer).unwrap();
        assert_eq!(record.permission, Permission::WriteOnly);
        assert_eq!(record.status, PacketTag::Welcome);
        assert_eq!(registry.peers_for(path), vec![peer]);
    }

    #[test]
    fn test_status_transitions() {
        let registry = Registry::new();
        let peer = Uuid::new_v4();
        let path = Path::new("/srv/dest");

        registry.record(path, peer, Permission::ReadOnly);
        registry.set_status(path, peer, PacketTag::Done);

        assert_eq!(registry.get(path, peer).unwrap().status, PacketTag::Done);
    }

    #[test]
    fn test_set_status_without_record_is_noop() {
        let registry = Registry::new();
        registry.set_status(Path::new("/nowhere"), Uuid::new_v4(), PacketTag::Err);
        assert!(registry.peers_for(Path::new("/nowhere")).is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = Registry::new();
        let clone = registry.clone();
        let peer = Uuid::new_v4();

        clone.record(Path::new("/srv/x"), peer, Permission::ReadOnly);
        assert!(registry.get(Path::new("/srv/x"), peer).is_some());
    }
}

//! Session construction and process-wide state.
//!
//! One [`Manager`] is built at process start and owns the objects every
//! session shares: the transport [`Context`], the local [`Uuid`] identity,
//! the permissions [`Registry`], and the [`KeyStore`]. Sessions are spawned
//! onto dedicated tasks and handed back as join handles; the process keeps
//! running whatever a single session does.

use crate::error::{ManagerError, SessionError};
use crate::permissions::Registry;
use crate::receiver::{run_receiver, ReceiverConfig};
use crate::transmitter::{run_transmitter, TransmitterConfig, UpdatesPredicate};
use skiff_crypto::{KeyRole, KeyStore};
use skiff_transport::{ClientConfig, Context, ServerConfig, ServerSocket};
use skiff_wire::PIPELINE;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Join handle for one running session.
pub type SessionHandle = JoinHandle<Result<(), SessionError>>;

/// Builder and owner of skiff sessions.
pub struct Manager {
    id: Uuid,
    ip: IpAddr,
    ctx: Context,
    registry: Registry,
    keys: KeyStore,
}

impl Manager {
    /// A manager reading key material under `keys_root`. Generates a fresh
    /// process identity and detects the outward-facing local address.
    #[must_use]
    pub fn new(keys_root: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ip: local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ctx: Context::new(),
            registry: Registry::new(),
            keys: KeyStore::new(keys_root),
        }
    }

    /// This process's stable identity.
    #[must_use]
    pub fn peer_id(&self) -> Uuid {
        self.id
    }

    /// The local address advertised in invitations.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// The shared permission records.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The transport context owning every socket.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Publish a directory (or single file) on `port` and serve it to the
    /// first whitelisted receiver that welcomes us.
    ///
    /// # Errors
    ///
    /// [`ManagerError::PathMissing`] when the path does not exist,
    /// [`ManagerError::Key`] when the transmitter key material is absent,
    /// [`ManagerError::Transport`] when the port cannot be bound.
    pub async fn publish(
        &self,
        port: u16,
        path: impl Into<PathBuf>,
        remote: Option<IpAddr>,
    ) -> Result<SessionHandle, ManagerError> {
        // Change detection is a stub pending real filesystem watching.
        self.publish_with(port, path, remote, Box::new(|| true)).await
    }

    /// [`Manager::publish`] with an injected change-detection predicate.
    ///
    /// # Errors
    ///
    /// Same as [`Manager::publish`].
    pub async fn publish_with(
        &self,
        port: u16,
        path: impl Into<PathBuf>,
        remote: Option<IpAddr>,
        updates: UpdatesPredicate,
    ) -> Result<SessionHandle, ManagerError> {
        let published = path.into();
        if !published.exists() {
            return Err(ManagerError::PathMissing(published));
        }
        let keypair = self.keys.load_keypair(KeyRole::Transmitter)?;
        let socket = ServerSocket::bind(
            ServerConfig {
                port,
                keypair,
                whitelist: self.whitelist(remote),
                hwm: PIPELINE,
            },
            &self.ctx,
        )
        .await?;
        tracing::info!(
            addr = %socket.local_addr(),
            path = %published.display(),
            "publishing"
        );

        let config = TransmitterConfig {
            local_id: self.id,
            published,
            registry: self.registry.clone(),
            updates,
        };
        Ok(tokio::spawn(run_transmitter(socket, config)))
    }

    /// Subscribe to a remote transmitter and pull into `path`.
    ///
    /// `server_key` is either a filesystem path to the transmitter's public
    /// key file or the raw hex key from the invitation.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Key`] when the receiver key material is absent or
    /// the server key argument cannot be resolved.
    pub async fn subscribe(
        &self,
        ip: IpAddr,
        port: u16,
        path: impl Into<PathBuf>,
        server_key: &str,
    ) -> Result<SessionHandle, ManagerError> {
        let keypair = self.keys.load_keypair(KeyRole::Receiver)?;
        let server_key = KeyStore::resolve_public_key(server_key)?;
        let transport = ClientConfig {
            addr: SocketAddr::new(ip, port),
            keypair,
            server_key,
            hwm: PIPELINE,
        };
        let config = ReceiverConfig {
            local_id: self.id,
            destination: path.into(),
            registry: self.registry.clone(),
        };
        tracing::info!(
            addr = %transport.addr,
            path = %config.destination.display(),
            "subscribing"
        );
        Ok(tokio::spawn(run_receiver(transport, self.ctx.clone(), config)))
    }

    /// The transmitter public key handed to invited receivers.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Key`] when the key file is absent.
    pub fn local_public_key(&self) -> Result<[u8; 32], ManagerError> {
        Ok(self.keys.public_key(KeyRole::Transmitter)?)
    }

    /// Terminate every running session.
    pub fn shutdown(&self) {
        self.ctx.shutdown();
    }

    fn whitelist(&self, remote: Option<IpAddr>) -> Vec<IpAddr> {
        let mut list = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            self.ip,
        ];
        if let Some(remote) = remote {
            list.push(remote);
        }
        list
    }
}

/// Learn the outward-facing address by routing a dummy datagram; nothing is
/// actually sent.
fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

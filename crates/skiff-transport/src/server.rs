//! Server-role socket: binds a port, authenticates whitelisted peers,
//! routes messages by an opaque per-connection token.

use crate::context::Context;
use crate::error::{RecvError, TransportError};
use crate::framing::{next_packet, pack, packet_codec, unpack};
use crate::Multipart;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use skiff_crypto::{Handshake, Keypair, Role};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Opaque routing token for one authenticated connection.
///
/// Supplied by the transport with every inbound message; the session echoes
/// it back as the destination of every reply. Tokens are never reused
/// within a socket's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerToken(u64);

impl std::fmt::Display for PeerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{:x}", self.0)
    }
}

/// Configuration for a server-role socket.
pub struct ServerConfig {
    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,
    /// Local static keypair (the Noise responder identity)
    pub keypair: Keypair,
    /// Source IPs allowed to connect; empty admits any source
    pub whitelist: Vec<IpAddr>,
    /// High-water mark: bound of every internal channel
    pub hwm: usize,
}

type PeerMap = Arc<Mutex<HashMap<PeerToken, mpsc::Sender<Multipart>>>>;

/// A bound, listening server socket.
///
/// Dropping the socket (or shutting down its [`Context`]) stops the accept
/// loop and closes every connection.
pub struct ServerSocket {
    local_addr: SocketAddr,
    inbound: mpsc::Receiver<(PeerToken, Multipart)>,
    peers: PeerMap,
    cancel: CancellationToken,
}

impl ServerSocket {
    /// Bind and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the port cannot be bound.
    pub async fn bind(config: ServerConfig, ctx: &Context) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        let local_addr = listener.local_addr()?;

        let cancel = ctx.child_token();
        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
        let (inbound_tx, inbound) = mpsc::channel(config.hwm.max(1));

        tokio::spawn(accept_loop(
            listener,
            config,
            Arc::clone(&peers),
            inbound_tx,
            cancel.clone(),
        ));

        Ok(Self {
            local_addr,
            inbound,
            peers,
            cancel,
        })
    }

    /// The address this socket is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait up to `wait` for the next inbound message from any peer.
    ///
    /// # Errors
    ///
    /// [`RecvError::TimedOut`] when nothing arrived in time;
    /// [`RecvError::Closed`] once the context is shut down.
    pub async fn recv_timeout(
        &mut self,
        wait: Duration,
    ) -> Result<(PeerToken, Multipart), RecvError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(RecvError::Closed),
            next = tokio::time::timeout(wait, self.inbound.recv()) => match next {
                Err(_) => Err(RecvError::TimedOut),
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(RecvError::Closed),
            },
        }
    }

    /// Send a message to one authenticated peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer has disconnected or
    /// the context is shut down.
    pub async fn send_to(
        &self,
        peer: PeerToken,
        frames: Multipart,
    ) -> Result<(), TransportError> {
        let sender = self
            .peers
            .lock()
            .expect("peer map poisoned")
            .get(&peer)
            .cloned()
            .ok_or(TransportError::Closed)?;
        sender
            .send(frames)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for ServerSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn allowed(whitelist: &[IpAddr], source: IpAddr) -> bool {
    whitelist.is_empty() || whitelist.contains(&source)
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    peers: PeerMap,
    inbound_tx: mpsc::Sender<(PeerToken, Multipart)>,
    cancel: CancellationToken,
) {
    let next_token = AtomicU64::new(1);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if !allowed(&config.whitelist, addr.ip()) {
                    tracing::warn!(%addr, "rejected non-whitelisted source");
                    continue;
                }
                let token = PeerToken(next_token.fetch_add(1, Ordering::Relaxed));
                tokio::spawn(serve_connection(
                    stream,
                    addr,
                    token,
                    config.keypair.clone(),
                    config.hwm.max(1),
                    Arc::clone(&peers),
                    inbound_tx.clone(),
                    cancel.child_token(),
                ));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    token: PeerToken,
    keypair: Keypair,
    hwm: usize,
    peers: PeerMap,
    inbound_tx: mpsc::Sender<(PeerToken, Multipart)>,
    cancel: CancellationToken,
) {
    tracing::debug!(%addr, %token, "connection accepted");
    if let Err(e) = connection_io(stream, token, &keypair, hwm, &peers, inbound_tx, cancel).await
    {
        tracing::debug!(%addr, %token, error = %e, "connection ended");
    }
    peers.lock().expect("peer map poisoned").remove(&token);
}

async fn connection_io(
    stream: TcpStream,
    token: PeerToken,
    keypair: &Keypair,
    hwm: usize,
    peers: &PeerMap,
    inbound_tx: mpsc::Sender<(PeerToken, Multipart)>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    let mut framed = Framed::new(stream, packet_codec());

    // Noise_XX as responder: read 1, write 2, read 3.
    let mut handshake = Handshake::new(Role::Server, keypair)?;
    let m1 = next_packet(&mut framed).await?;
    handshake.read_message(&m1)?;
    framed.send(Bytes::from(handshake.write_message()?)).await?;
    let m3 = next_packet(&mut framed).await?;
    handshake.read_message(&m3)?;
    let mut channel = handshake.into_channel()?;

    let (out_tx, mut out_rx) = mpsc::channel::<Multipart>(hwm);
    peers
        .lock()
        .expect("peer map poisoned")
        .insert(token, out_tx);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            outbound = out_rx.recv() => match outbound {
                Some(frames) => {
                    let sealed = channel.seal(&pack(&frames))?;
                    framed.send(Bytes::from(sealed)).await?;
                }
                None => break,
            },
            inbound = framed.next() => match inbound {
                Some(Ok(sealed)) => {
                    let plain = channel.open(&sealed)?;
                    let frames = unpack(&plain)?;
                    if inbound_tx.send((token, frames)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }
    Ok(())
}

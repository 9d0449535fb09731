//! Receiver side: pull files chunk by chunk with a credit window.
//!
//! States: awaiting-handshake, awaiting-advertise, requesting-name,
//! receiving-file, done. The receiver owns connection establishment so the
//! whole handshake (connect retries included) lives under the session
//! deadline: a transmitter that binds late is retried every second until
//! the deadline runs out.

use crate::error::SessionError;
use crate::permissions::{Permission, Registry};
use crate::window::ChunkWindow;
use skiff_transport::{ClientConfig, ClientSocket, Context, RecvError, TransportError};
use skiff_wire::{Message, PacketTag, CHUNK_SIZE, RECV_TIMEOUT, SESSION_DEADLINE};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Everything a receiver session needs besides its transport config.
pub struct ReceiverConfig {
    /// This process's identity, sent in the `WELCOME`
    pub local_id: Uuid,
    /// Directory received files are resolved under
    pub destination: PathBuf,
    /// Shared permission records
    pub registry: Registry,
}

/// Drive a receiver session to its terminal state.
///
/// Returns `Ok(())` on a completed transfer and on context shutdown (the
/// silent, graceful exit); every other failure is surfaced after the
/// registry status is updated. A partially-written file is left on disk.
///
/// # Errors
///
/// [`SessionError::HandshakeTimeout`] / [`SessionError::TransferTimeout`]
/// past the session deadline, [`SessionError::Protocol`] for an unexpected
/// reply mid-file or a server key mismatch, plus fatal wire and I/O errors.
pub async fn run_receiver(
    transport: ClientConfig,
    ctx: Context,
    config: ReceiverConfig,
) -> Result<(), SessionError> {
    let deadline = Instant::now() + SESSION_DEADLINE;
    std::fs::create_dir_all(&config.destination)?;

    let (mut socket, remote) = match handshake(&transport, &ctx, &config, deadline).await {
        Ok(pair) => pair,
        Err(SessionError::TransportClosed) => {
            tracing::debug!("receiver: transport closed before handshake");
            return Ok(());
        }
        Err(e) => {
            tracing::error!(error = %e, "receiver: handshake failed");
            return Err(e);
        }
    };
    tracing::info!(%remote, "receiver: session established");

    let result = pull(&mut socket, &config, deadline).await;
    match result {
        Ok(()) => {
            config
                .registry
                .set_status(&config.destination, remote, PacketTag::Done);
            Ok(())
        }
        Err(SessionError::TransportClosed) => {
            config
                .registry
                .set_status(&config.destination, remote, PacketTag::Err);
            tracing::debug!("receiver: transport closed mid-session");
            Ok(())
        }
        Err(e) => {
            config
                .registry
                .set_status(&config.destination, remote, PacketTag::Err);
            tracing::error!(error = %e, "receiver: session failed");
            Err(e)
        }
    }
}

/// Connect and exchange `WELCOME`/`ACK`, retrying every receive-timeout
/// until the deadline.
async fn handshake(
    transport: &ClientConfig,
    ctx: &Context,
    config: &ReceiverConfig,
    deadline: Instant,
) -> Result<(ClientSocket, Uuid), SessionError> {
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::HandshakeTimeout);
        }
        if ctx.is_shutdown() {
            return Err(SessionError::TransportClosed);
        }

        let mut socket = match ClientSocket::connect(transport.clone(), ctx).await {
            Ok(socket) => socket,
            Err(TransportError::ServerKeyMismatch) => {
                return Err(SessionError::Protocol("server key mismatch".into()));
            }
            Err(e) => {
                tracing::debug!(error = %e, "receiver: connect failed, retrying");
                tokio::time::sleep(RECV_TIMEOUT).await;
                continue;
            }
        };

        loop {
            if Instant::now() >= deadline {
                return Err(SessionError::HandshakeTimeout);
            }
            let welcome = Message::Welcome { peer: config.local_id };
            if socket.send(welcome.to_frames()).await.is_err() {
                // Connection died under us; rebuild it.
                break;
            }
            match socket.recv_timeout(RECV_TIMEOUT).await {
                Ok(frames) => match Message::from_frames(&frames)? {
                    Message::Ack { peer } => {
                        config
                            .registry
                            .record(&config.destination, peer, Permission::ReadOnly);
                        return Ok((socket, peer));
                    }
                    other => {
                        tracing::debug!(tag = %other.tag(), "receiver: unexpected handshake reply");
                    }
                },
                Err(RecvError::TimedOut) => {}
                Err(RecvError::Closed) => break,
            }
        }
        tokio::time::sleep(RECV_TIMEOUT).await;
    }
}

async fn pull(
    socket: &mut ClientSocket,
    config: &ReceiverConfig,
    deadline: Instant,
) -> Result<(), SessionError> {
    // Awaiting-Advertise: only UPDATES moves us forward.
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::TransferTimeout);
        }
        match socket.recv_timeout(RECV_TIMEOUT).await {
            Ok(frames) => match Message::from_frames(&frames)? {
                Message::Updates => break,
                other => {
                    tracing::debug!(tag = %other.tag(), "receiver: ignored while awaiting advertise");
                }
            },
            Err(RecvError::TimedOut) => {}
            Err(RecvError::Closed) => return Err(SessionError::TransportClosed),
        }
    }
    tracing::debug!("receiver: updates advertised");

    loop {
        if socket.send(Message::NameRequest.to_frames()).await.is_err() {
            // The connection may already be winding down with the terminal
            // DONE buffered; the reply loop below still drains it.
            tracing::debug!("receiver: name request not sent, draining replies");
        }
        match await_name(socket, deadline).await? {
            Some(path) => receive_file(socket, config, &path, deadline).await?,
            None => {
                tracing::info!("receiver: transfer complete");
                return Ok(());
            }
        }
    }
}

/// Requesting-Name: wait for the reply, draining stale chunk replies left
/// over from the previous file's pipelined requests.
async fn await_name(
    socket: &mut ClientSocket,
    deadline: Instant,
) -> Result<Option<String>, SessionError> {
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::TransferTimeout);
        }
        match socket.recv_timeout(RECV_TIMEOUT).await {
            Ok(frames) => match Message::from_frames(&frames)? {
                Message::Done => return Ok(None),
                Message::Name { path } => return Ok(Some(path)),
                Message::Chunk { data } => {
                    // Over-requested replies past EOF; all zero-length.
                    tracing::trace!(len = data.len(), "receiver: drained stale chunk");
                }
                other => {
                    tracing::debug!(tag = %other.tag(), "receiver: reissuing name request");
                    socket
                        .send(Message::NameRequest.to_frames())
                        .await
                        .map_err(SessionError::from)?;
                }
            },
            Err(RecvError::TimedOut) => {}
            Err(RecvError::Closed) => return Err(SessionError::TransportClosed),
        }
    }
}

/// Receiving-File: keep the window drained and write replies in order
/// until a short read marks EOF.
async fn receive_file(
    socket: &mut ClientSocket,
    config: &ReceiverConfig,
    rel_path: &str,
    deadline: Instant,
) -> Result<(), SessionError> {
    let local = config.destination.join(rel_path);
    if let Some(parent) = local.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&local)?;
    let mut window = ChunkWindow::default();
    tracing::debug!(path = %local.display(), "receiver: opening file");

    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::TransferTimeout);
        }
        for (offset, length) in window.drain_requests() {
            socket
                .send(Message::Fetch { offset, length }.to_frames())
                .await
                .map_err(SessionError::from)?;
        }
        let frames = match socket.recv_timeout(RECV_TIMEOUT).await {
            Ok(frames) => frames,
            Err(RecvError::TimedOut) => continue,
            Err(RecvError::Closed) => return Err(SessionError::TransportClosed),
        };
        match Message::from_frames(&frames)? {
            Message::Chunk { data } => {
                window.on_reply(data.len());
                file.write_all(&data)?;
                if data.len() < CHUNK_SIZE {
                    socket
                        .send(Message::Done.to_frames())
                        .await
                        .map_err(SessionError::from)?;
                    tracing::debug!(
                        bytes = window.bytes_received(),
                        chunks = window.chunks_received(),
                        "receiver: file complete"
                    );
                    return Ok(());
                }
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "unexpected {} while receiving a file",
                    other.tag()
                )));
            }
        }
    }
}

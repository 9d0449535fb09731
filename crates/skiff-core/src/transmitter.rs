//! Transmitter side: serve filename and chunk requests from a walked list.
//!
//! States: awaiting-handshake, ready, advertising/serving, done. The
//! serving core ([`FileServer`]) is a plain struct that consumes decoded
//! messages and produces steps, so the whole request grammar is testable
//! without a socket; [`run_transmitter`] wires it to a [`ServerSocket`].

use crate::error::SessionError;
use crate::job::TransferJob;
use crate::permissions::{Permission, Registry};
use bytes::Bytes;
use skiff_transport::{PeerToken, RecvError, ServerSocket};
use skiff_wire::{Message, PacketTag, RECV_TIMEOUT, SESSION_DEADLINE};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Upper bound honored for a single `FETCH`, so a bogus request cannot
/// balloon a reply past what the transport will frame.
const MAX_FETCH_LEN: u64 = 512 * 1024;

/// Pluggable change-detection hook. The default always reports updates,
/// which advertises the whole snapshot once per session.
pub type UpdatesPredicate = Box<dyn Fn() -> bool + Send + Sync>;

/// Everything a transmitter session needs besides its socket.
pub struct TransmitterConfig {
    /// This process's identity, sent in the `ACK`
    pub local_id: Uuid,
    /// Directory or single file being published
    pub published: PathBuf,
    /// Shared permission records
    pub registry: Registry,
    /// Change-detection predicate gating the advertise
    pub updates: UpdatesPredicate,
}

/// One step of the serving state machine.
#[derive(Debug)]
pub enum ServeStep {
    /// Send this reply to the session peer
    Reply(Message),
    /// The peer finished a file; the cursor moved, nothing to send
    Advance,
    /// Every file is served (or there were none): send `DONE`, terminate
    Finished,
    /// Forward-compatible: unknown-in-context tag, dropped
    Ignored,
}

/// The serving core: a file-list snapshot, a cursor, and the source file
/// held open for the life of its requests.
pub struct FileServer {
    job: TransferJob,
    current: Option<File>,
}

impl FileServer {
    /// Serve from a captured snapshot.
    #[must_use]
    pub fn new(job: TransferJob) -> Self {
        Self { job, current: None }
    }

    /// Consume one inbound message and produce the next step.
    ///
    /// # Errors
    ///
    /// [`SessionError::Protocol`] for a `FETCH` with no named file, and
    /// [`SessionError::Io`] when the source file cannot be opened or read.
    pub fn handle(&mut self, msg: &Message) -> Result<ServeStep, SessionError> {
        match msg {
            Message::NameRequest => match self.job.current() {
                Some(entry) => {
                    let path = entry.wire_path()?.to_owned();
                    // Hold the file open for the whole per-file scope
                    // rather than reopening per request.
                    self.current = Some(File::open(&entry.absolute)?);
                    Ok(ServeStep::Reply(Message::Name { path }))
                }
                None => Ok(ServeStep::Finished),
            },
            Message::Fetch { offset, length } => {
                let file = self
                    .current
                    .as_mut()
                    .ok_or_else(|| SessionError::Protocol("FETCH before NAME".into()))?;
                let data = read_chunk(file, *offset, (*length).min(MAX_FETCH_LEN) as usize)?;
                Ok(ServeStep::Reply(Message::Chunk { data: Bytes::from(data) }))
            }
            Message::Done => {
                self.current = None;
                self.job.advance();
                if self.job.current().is_none() {
                    Ok(ServeStep::Finished)
                } else {
                    Ok(ServeStep::Advance)
                }
            }
            _ => Ok(ServeStep::Ignored),
        }
    }

}

/// Seek and read up to `length` bytes; short or empty at EOF, never padded.
fn read_chunk(file: &mut File, offset: u64, length: usize) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Drive a transmitter session to its terminal state.
///
/// Returns `Ok(())` both on a completed transfer and on a context shutdown
/// (the silent, graceful exit); every other failure is surfaced after the
/// registry status is updated.
///
/// # Errors
///
/// [`SessionError::HandshakeTimeout`] / [`SessionError::TransferTimeout`]
/// past the session deadline, plus any fatal protocol, wire, or I/O error.
pub async fn run_transmitter(
    mut socket: ServerSocket,
    config: TransmitterConfig,
) -> Result<(), SessionError> {
    let deadline = Instant::now() + SESSION_DEADLINE;

    let (token, remote) = match await_handshake(&mut socket, &config, deadline).await {
        Ok(pair) => pair,
        Err(SessionError::TransportClosed) => {
            tracing::debug!("transmitter: transport closed before handshake");
            return Ok(());
        }
        Err(e) => {
            tracing::error!(error = %e, "transmitter: handshake failed");
            return Err(e);
        }
    };
    tracing::info!(%token, %remote, "transmitter: session accepted");

    let result = serve(&mut socket, &config, token, deadline).await;
    match result {
        Ok(()) => {
            config
                .registry
                .set_status(&config.published, remote, PacketTag::Done);
            Ok(())
        }
        Err(SessionError::TransportClosed) => {
            config
                .registry
                .set_status(&config.published, remote, PacketTag::Err);
            tracing::debug!("transmitter: transport closed mid-session");
            Ok(())
        }
        Err(e) => {
            config
                .registry
                .set_status(&config.published, remote, PacketTag::Err);
            tracing::error!(error = %e, "transmitter: session failed");
            Err(e)
        }
    }
}

async fn await_handshake(
    socket: &mut ServerSocket,
    config: &TransmitterConfig,
    deadline: Instant,
) -> Result<(PeerToken, Uuid), SessionError> {
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::HandshakeTimeout);
        }
        match socket.recv_timeout(RECV_TIMEOUT).await {
            Ok((token, frames)) => match Message::from_frames(&frames)? {
                Message::Welcome { peer } => {
                    socket
                        .send_to(token, Message::Ack { peer: config.local_id }.to_frames())
                        .await?;
                    config
                        .registry
                        .record(&config.published, peer, Permission::WriteOnly);
                    return Ok((token, peer));
                }
                other => {
                    tracing::debug!(tag = %other.tag(), "transmitter: ignored before handshake");
                }
            },
            Err(RecvError::TimedOut) => {}
            Err(RecvError::Closed) => return Err(SessionError::TransportClosed),
        }
    }
}

async fn serve(
    socket: &mut ServerSocket,
    config: &TransmitterConfig,
    token: PeerToken,
    deadline: Instant,
) -> Result<(), SessionError> {
    // Ready -> Advertising once the predicate reports changes.
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::TransferTimeout);
        }
        if (config.updates)() {
            break;
        }
        tokio::time::sleep(RECV_TIMEOUT).await;
    }

    socket.send_to(token, Message::Updates.to_frames()).await?;
    let job = TransferJob::snapshot(&config.published)?;
    tracing::info!(files = job.len(), "transmitter: advertised snapshot");
    let mut server = FileServer::new(job);

    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::TransferTimeout);
        }
        let (from, frames) = match socket.recv_timeout(RECV_TIMEOUT).await {
            Ok(pair) => pair,
            Err(RecvError::TimedOut) => continue,
            Err(RecvError::Closed) => return Err(SessionError::TransportClosed),
        };
        if from != token {
            tracing::debug!(%from, "transmitter: ignored message from non-session peer");
            continue;
        }
        match server.handle(&Message::from_frames(&frames)?)? {
            ServeStep::Reply(reply) => socket.send_to(token, reply.to_frames()).await?,
            ServeStep::Advance => {}
            ServeStep::Finished => {
                socket.send_to(token, Message::Done.to_frames()).await?;
                tracing::info!("transmitter: transfer complete");
                return Ok(());
            }
            ServeStep::Ignored => {}
        }
    }
}

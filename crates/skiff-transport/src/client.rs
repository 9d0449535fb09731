//! Client-role socket: one outbound authenticated connection.

use crate::context::Context;
use crate::error::{RecvError, TransportError};
use crate::framing::{next_packet, pack, packet_codec, unpack};
use crate::Multipart;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use skiff_crypto::{Handshake, Keypair, Role, SecureChannel};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

/// Configuration for a client-role socket.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server address to connect to
    pub addr: SocketAddr,
    /// Local static keypair (the Noise initiator identity)
    pub keypair: Keypair,
    /// The server's expected static public key; the connection is aborted
    /// if the handshake presents any other key
    pub server_key: [u8; 32],
    /// High-water mark: bound of every internal channel
    pub hwm: usize,
}

/// A connected, authenticated client socket.
pub struct ClientSocket {
    outbound: mpsc::Sender<Multipart>,
    inbound: mpsc::Receiver<Multipart>,
    cancel: CancellationToken,
}

impl ClientSocket {
    /// Connect, run the Noise handshake, and verify the server's identity.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] when the TCP connect fails (e.g. the server
    /// is not up yet), [`TransportError::ServerKeyMismatch`] when the
    /// responder's static key is not the expected one, and
    /// [`TransportError::Crypto`] / [`TransportError::Closed`] for a
    /// handshake that fails or a connection dropped mid-handshake.
    pub async fn connect(config: ClientConfig, ctx: &Context) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(config.addr).await?;
        let mut framed = Framed::new(stream, packet_codec());

        // Noise_XX as initiator: write 1, read 2, write 3.
        let mut handshake = Handshake::new(Role::Client, &config.keypair)?;
        framed.send(Bytes::from(handshake.write_message()?)).await?;
        let m2 = next_packet(&mut framed).await?;
        handshake.read_message(&m2)?;
        if handshake.remote_static() != Some(config.server_key) {
            return Err(TransportError::ServerKeyMismatch);
        }
        framed.send(Bytes::from(handshake.write_message()?)).await?;
        let channel = handshake.into_channel()?;

        let cancel = ctx.child_token();
        let hwm = config.hwm.max(1);
        let (out_tx, out_rx) = mpsc::channel(hwm);
        let (in_tx, inbound) = mpsc::channel(hwm);

        tokio::spawn(connection_io(framed, channel, out_rx, in_tx, cancel.clone()));

        Ok(Self {
            outbound: out_tx,
            inbound,
            cancel,
        })
    }

    /// Send one message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection or context is
    /// gone.
    pub async fn send(&self, frames: Multipart) -> Result<(), TransportError> {
        self.outbound
            .send(frames)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Wait up to `wait` for the next inbound message.
    ///
    /// # Errors
    ///
    /// [`RecvError::TimedOut`] when nothing arrived in time;
    /// [`RecvError::Closed`] once the connection or context is gone.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Multipart, RecvError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(RecvError::Closed),
            next = tokio::time::timeout(wait, self.inbound.recv()) => match next {
                Err(_) => Err(RecvError::TimedOut),
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(RecvError::Closed),
            },
        }
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn connection_io(
    mut framed: Framed<TcpStream, LengthDelimitedCodec>,
    mut channel: SecureChannel,
    mut out_rx: mpsc::Receiver<Multipart>,
    in_tx: mpsc::Sender<Multipart>,
    cancel: CancellationToken,
) {
    let result: Result<(), TransportError> = async {
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
                        if in_tx.send(frames).await.is_err() {
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
    .await;

    if let Err(e) = result {
        tracing::debug!(error = %e, "client connection ended");
    }
}

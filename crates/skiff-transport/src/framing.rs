//! Multipart packing inside a packet.
//!
//! A packet's plaintext is a flat concatenation of frames, each prefixed by
//! a u32 big-endian length. An empty frame is legal (a zero-length chunk);
//! an empty packet is not.

use crate::{MAX_PACKET, Multipart, TransportError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Length-delimited codec shared by both socket roles.
pub(crate) fn packet_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_PACKET)
        .new_codec()
}

/// Read the next raw packet off a framed stream.
pub(crate) async fn next_packet(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
) -> Result<BytesMut, TransportError> {
    match framed.next().await {
        Some(Ok(buf)) => Ok(buf),
        Some(Err(e)) => Err(e.into()),
        None => Err(TransportError::Closed),
    }
}

/// Serialize frames into one plaintext packet.
#[must_use]
pub fn pack(frames: &[Bytes]) -> Bytes {
    let total: usize = frames.iter().map(|f| 4 + f.len()).sum();
    let mut buf = BytesMut::with_capacity(total);
    for frame in frames {
        buf.put_u32(frame.len() as u32);
        buf.put_slice(frame);
    }
    buf.freeze()
}

/// Parse one plaintext packet back into frames.
///
/// # Errors
///
/// Returns [`TransportError::MalformedPacket`] for an empty packet, a
/// truncated frame, or a frame length beyond [`MAX_PACKET`].
pub fn unpack(packet: &[u8]) -> Result<Multipart, TransportError> {
    let mut rest = packet;
    let mut frames = Vec::new();
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(TransportError::MalformedPacket);
        }
        let len = rest.get_u32() as usize;
        if len > MAX_PACKET || rest.len() < len {
            return Err(TransportError::MalformedPacket);
        }
        frames.push(Bytes::copy_from_slice(&rest[..len]));
        rest.advance(len);
    }
    if frames.is_empty() {
        return Err(TransportError::MalformedPacket);
    }
    Ok(frames)
}

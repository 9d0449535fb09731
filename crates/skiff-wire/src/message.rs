//! Message encoding and decoding for the skiff wire protocol.
//!
//! A message is a short sequence of byte frames. The first frame names a
//! [`PacketTag`]; the rest are tag-specific payload frames. Tags are reused
//! between request and reply directions (`NAME`, `FETCH`) and the two shapes
//! are disambiguated by frame arity, so decoding is unambiguous without any
//! direction flag on the wire.

use crate::error::WireError;
use bytes::Bytes;
use uuid::Uuid;

/// Packet tags, carried as short ASCII byte strings in the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketTag {
    /// Reserved error channel; never emitted by this version
    Err,
    /// Handshake accept
    Ack,
    /// Handshake initiate
    Welcome,
    /// Transmitter advertises that files are available
    Updates,
    /// Filename request / reply
    Name,
    /// File complete (receiver) / transfer complete (transmitter)
    Done,
    /// Chunk request / chunk data
    Fetch,
}

impl PacketTag {
    /// The ASCII bytes this tag occupies on the wire.
    #[must_use]
    pub const fn wire_bytes(self) -> &'static [u8] {
        match self {
            Self::Err => b"-1",
            Self::Ack => b"0",
            Self::Welcome => b"1",
            Self::Updates => b"2",
            Self::Name => b"3",
            Self::Done => b"4",
            Self::Fetch => b"5",
        }
    }

    /// Short uppercase name, used in diagnostics and permission records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Err => "ERR",
            Self::Ack => "ACK",
            Self::Welcome => "WELCOME",
            Self::Updates => "UPDATES",
            Self::Name => "NAME",
            Self::Done => "DONE",
            Self::Fetch => "FETCH",
        }
    }

    /// Parse a tag frame.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownTag`] for any byte string outside the
    /// closed tag set.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        match bytes {
            b"-1" => Ok(Self::Err),
            b"0" => Ok(Self::Ack),
            b"1" => Ok(Self::Welcome),
            b"2" => Ok(Self::Updates),
            b"3" => Ok(Self::Name),
            b"4" => Ok(Self::Done),
            b"5" => Ok(Self::Fetch),
            other => Err(WireError::UnknownTag(other.to_vec())),
        }
    }
}

impl std::fmt::Display for PacketTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded wire message.
///
/// Decode once at the edge; everything downstream pattern-matches on this
/// enum exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `[ERR, ...]` - reserved, payload ignored
    Err,
    /// `[WELCOME, peer_id]` - receiver initiates the session
    Welcome {
        /// Initiator's process identity
        peer: Uuid,
    },
    /// `[ACK, peer_id]` - transmitter accepts the session
    Ack {
        /// Responder's process identity
        peer: Uuid,
    },
    /// `[UPDATES]` - files are available to pull
    Updates,
    /// `[NAME]` - receiver requests the next filename
    NameRequest,
    /// `[NAME, rel_path]` - transmitter names the current file
    Name {
        /// Path relative to the published directory, UTF-8
        path: String,
    },
    /// `[FETCH, offset, length]` - receiver requests bytes
    Fetch {
        /// First byte requested
        offset: u64,
        /// Bytes requested; replies may be shorter
        length: u64,
    },
    /// `[FETCH, data]` - transmitter returns bytes; short or empty means EOF
    Chunk {
        /// Up to the requested number of bytes
        data: Bytes,
    },
    /// `[DONE]` - current file complete (RX) or transfer complete (TX)
    Done,
}

impl Message {
    /// The tag this message carries in its first frame.
    #[must_use]
    pub fn tag(&self) -> PacketTag {
        match self {
            Self::Err => PacketTag::Err,
            Self::Welcome { .. } => PacketTag::Welcome,
            Self::Ack { .. } => PacketTag::Ack,
            Self::Updates => PacketTag::Updates,
            Self::NameRequest | Self::Name { .. } => PacketTag::Name,
            Self::Fetch { .. } | Self::Chunk { .. } => PacketTag::Fetch,
            Self::Done => PacketTag::Done,
        }
    }

    /// Encode into wire frames, tag first.
    #[must_use]
    pub fn to_frames(&self) -> Vec<Bytes> {
        let tag = Bytes::from_static(self.tag().wire_bytes());
        match self {
            Self::Err | Self::Updates | Self::NameRequest | Self::Done => vec![tag],
            Self::Welcome { peer } | Self::Ack { peer } => {
                vec![tag, Bytes::copy_from_slice(peer.as_bytes())]
            }
            Self::Name { path } => vec![tag, Bytes::copy_from_slice(path.as_bytes())],
            Self::Fetch { offset, length } => vec![
                tag,
                Bytes::from(offset.to_string().into_bytes()),
                Bytes::from(length.to_string().into_bytes()),
            ],
            Self::Chunk { data } => vec![tag, data.clone()],
        }
    }

    /// Decode wire frames into a message.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] when the first frame is not a recognized tag
    /// or the frame count / payload shape is wrong for that tag. `ERR`
    /// tolerates any payload since its body is reserved.
    pub fn from_frames(frames: &[Bytes]) -> Result<Self, WireError> {
        let (tag_frame, payload) = frames.split_first().ok_or(WireError::Empty)?;
        let tag = PacketTag::from_wire(tag_frame)?;

        match (tag, payload) {
            (PacketTag::Err, _) => Ok(Self::Err),
            (PacketTag::Welcome, [peer]) => Ok(Self::Welcome {
                peer: parse_peer_id(peer)?,
            }),
            (PacketTag::Ack, [peer]) => Ok(Self::Ack {
                peer: parse_peer_id(peer)?,
            }),
            (PacketTag::Updates, []) => Ok(Self::Updates),
            (PacketTag::Name, []) => Ok(Self::NameRequest),
            (PacketTag::Name, [path]) => Ok(Self::Name {
                path: std::str::from_utf8(path)
                    .map_err(|_| WireError::BadPath)?
                    .to_owned(),
            }),
            (PacketTag::Fetch, [offset, length]) => Ok(Self::Fetch {
                offset: parse_decimal(offset)?,
                length: parse_decimal(length)?,
            }),
            (PacketTag::Fetch, [data]) => Ok(Self::Chunk { data: data.clone() }),
            (PacketTag::Done, []) => Ok(Self::Done),
            _ => Err(WireError::Arity {
                tag: tag.name(),
                frames: frames.len(),
            }),
        }
    }
}

fn parse_peer_id(frame: &Bytes) -> Result<Uuid, WireError> {
    let raw: [u8; 16] = frame
        .as_ref()
        .try_into()
        .map_err(|_| WireError::BadPeerId(frame.len()))?;
    Ok(Uuid::from_bytes(raw))
}

fn parse_decimal(frame: &Bytes) -> Result<u64, WireError> {
    std::str::from_utf8(frame)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| WireError::BadInteger(frame.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let frames = msg.to_frames();
        assert_eq!(Message::from_frames(&frames).unwrap(), msg);
    }

    #[test]
    fn test_roundtrip_all_variants() {
        roundtrip(Message::Err);
        roundtrip(Message::Welcome { peer: Uuid::new_v4() });
        roundtrip(Message::Ack { peer: Uuid::new_v4() });
        roundtrip(Message::Updates);
        roundtrip(Message::NameRequest);
        roundtrip(Message::Name {
            path: "sub/dir/x.bin".into(),
        });
        roundtrip(Message::Fetch {
            offset: 750_000,
            length: 250_000,
        });
        roundtrip(Message::Chunk {
            data: Bytes::from_static(b"hello"),
        });
        roundtrip(Message::Done);
    }

    #[test]
    fn test_tag_wire_bytes() {
        assert_eq!(PacketTag::Err.wire_bytes(), b"-1");
        assert_eq!(PacketTag::Ack.wire_bytes(), b"0");
        assert_eq!(PacketTag::Welcome.wire_bytes(), b"1");
        assert_eq!(PacketTag::Updates.wire_bytes(), b"2");
        assert_eq!(PacketTag::Name.wire_bytes(), b"3");
        assert_eq!(PacketTag::Done.wire_bytes(), b"4");
        assert_eq!(PacketTag::Fetch.wire_bytes(), b"5");
    }

    #[test]
    fn test_name_shapes_by_arity() {
        let req = Message::from_frames(&[Bytes::from_static(b"3")]).unwrap();
        assert_eq!(req, Message::NameRequest);

        let reply =
            Message::from_frames(&[Bytes::from_static(b"3"), Bytes::from_static(b"a.txt")])
                .unwrap();
        assert_eq!(reply, Message::Name { path: "a.txt".into() });
    }

    #[test]
    fn test_fetch_shapes_by_arity() {
        let req = Message::from_frames(&[
            Bytes::from_static(b"5"),
            Bytes::from_static(b"0"),
            Bytes::from_static(b"250000"),
        ])
        .unwrap();
        assert_eq!(req, Message::Fetch { offset: 0, length: 250_000 });

        // A data frame that happens to hold ASCII digits is still a chunk
        let chunk =
            Message::from_frames(&[Bytes::from_static(b"5"), Bytes::from_static(b"12345")])
                .unwrap();
        assert_eq!(chunk, Message::Chunk { data: Bytes::from_static(b"12345") });
    }

    #[test]
    fn test_empty_chunk_is_valid() {
        let chunk =
            Message::from_frames(&[Bytes::from_static(b"5"), Bytes::new()]).unwrap();
        assert_eq!(chunk, Message::Chunk { data: Bytes::new() });
    }

    #[test]
    fn test_empty_message_rejected() {
        assert_eq!(Message::from_frames(&[]), Err(WireError::Empty));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = Message::from_frames(&[Bytes::from_static(b"9")]).unwrap_err();
        assert_eq!(err, WireError::UnknownTag(b"9".to_vec()));
    }

    #[test]
    fn test_arity_violations_rejected() {
        // UPDATES takes no payload
        let err = Message::from_frames(&[
            Bytes::from_static(b"2"),
            Bytes::from_static(b"extra"),
        ])
        .unwrap_err();
        assert!(matches!(err, WireError::Arity { tag: "UPDATES", frames: 2 }));

        // FETCH never takes three payload frames
        let err = Message::from_frames(&[
            Bytes::from_static(b"5"),
            Bytes::from_static(b"0"),
            Bytes::from_static(b"1"),
            Bytes::from_static(b"2"),
        ])
        .unwrap_err();
        assert!(matches!(err, WireError::Arity { tag: "FETCH", frames: 4 }));
    }

    #[test]
    fn test_bad_peer_id_length() {
        let err = Message::from_frames(&[
            Bytes::from_static(b"1"),
            Bytes::from_static(b"short"),
        ])
        .unwrap_err();
        assert_eq!(err, WireError::BadPeerId(5));
    }

    #[test]
    fn test_bad_decimal_rejected() {
        let err = Message::from_frames(&[
            Bytes::from_static(b"5"),
            Bytes::from_static(b"ten"),
            Bytes::from_static(b"250000"),
        ])
        .unwrap_err();
        assert_eq!(err, WireError::BadInteger(b"ten".to_vec()));
    }

    #[test]
    fn test_bad_path_rejected() {
        let err = Message::from_frames(&[
            Bytes::from_static(b"3"),
            Bytes::from_static(&[0xFF, 0xFE]),
        ])
        .unwrap_err();
        assert_eq!(err, WireError::BadPath);
    }

    #[test]
    fn test_err_tolerates_any_payload() {
        let msg = Message::from_frames(&[
            Bytes::from_static(b"-1"),
            Bytes::from_static(b"whatever"),
            Bytes::from_static(b"else"),
        ])
        .unwrap();
        assert_eq!(msg, Message::Err);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_decode_never_panics(
                frames in prop::collection::vec(
                    prop::collection::vec(any::<u8>(), 0..64),
                    0..6,
                )
            ) {
                let frames: Vec<Bytes> = frames.into_iter().map(Bytes::from).collect();
                let _ = Message::from_frames(&frames);
            }

            #[test]
            fn prop_fetch_roundtrip(offset in any::<u64>(), length in any::<u64>()) {
                let msg = Message::Fetch { offset, length };
                prop_assert_eq!(Message::from_frames(&msg.to_frames()).unwrap(), msg);
            }

            #[test]
            fn prop_chunk_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
                let msg = Message::Chunk { data: Bytes::from(data) };
                prop_assert_eq!(Message::from_frames(&msg.to_frames()).unwrap(), msg);
            }

            #[test]
            fn prop_name_roundtrip(path in "[a-zA-Z0-9_./-]{1,64}") {
                let msg = Message::Name { path };
                prop_assert_eq!(Message::from_frames(&msg.to_frames()).unwrap(), msg);
            }

            #[test]
            fn prop_peer_roundtrip(raw in any::<[u8; 16]>()) {
                let msg = Message::Welcome { peer: Uuid::from_bytes(raw) };
                prop_assert_eq!(Message::from_frames(&msg.to_frames()).unwrap(), msg);
            }
        }
    }
}

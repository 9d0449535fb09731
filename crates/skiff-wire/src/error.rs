//! Wire-level decode errors.

use thiserror::Error;

/// Errors produced when decoding frames into a [`crate::Message`].
///
/// Every variant is a shape violation: the frames cannot have been produced
/// by a conforming encoder, so the session treats them as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A message must carry at least the tag frame
    #[error("empty message")]
    Empty,

    /// First frame is not a recognized packet tag
    #[error("unknown packet tag {0:?}")]
    UnknownTag(Vec<u8>),

    /// Frame count does not match any shape for the tag
    #[error("tag {tag} does not take {frames} frame(s)")]
    Arity {
        /// Tag named by the first frame
        tag: &'static str,
        /// Number of frames received, tag included
        frames: usize,
    },

    /// Offset or length frame is not an ASCII decimal integer
    #[error("malformed decimal field {0:?}")]
    BadInteger(Vec<u8>),

    /// Relative path frame is not valid UTF-8
    #[error("relative path is not valid UTF-8")]
    BadPath,

    /// Peer identifier frame is not exactly 16 bytes
    #[error("peer id must be 16 bytes, got {0}")]
    BadPeerId(usize),
}

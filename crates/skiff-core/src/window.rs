//! Credit window for pipelined chunk requests.

use skiff_wire::{CHUNK_SIZE, PIPELINE};

/// Pipelining state for the file currently being received.
///
/// A plain counter is all the receiver needs: it is single-threaded per
/// session, so `credit + outstanding == pipeline` holds between every
/// send/receive pair. A fresh window starts with full credit, letting the
/// requests for a new file go out before its first byte arrives.
#[derive(Debug)]
pub struct ChunkWindow {
    credit: usize,
    pipeline: usize,
    offset: u64,
    chunks_received: u64,
    bytes_received: u64,
}

impl Default for ChunkWindow {
    fn default() -> Self {
        Self::new(PIPELINE)
    }
}

impl ChunkWindow {
    /// A full window of `pipeline` credits starting at offset 0.
    #[must_use]
    pub fn new(pipeline: usize) -> Self {
        Self {
            credit: pipeline,
            pipeline,
            offset: 0,
            chunks_received: 0,
            bytes_received: 0,
        }
    }

    /// Drain all available credit into `(offset, length)` requests of
    /// [`CHUNK_SIZE`] each, advancing the request offset.
    pub fn drain_requests(&mut self) -> Vec<(u64, u64)> {
        let mut requests = Vec::with_capacity(self.credit);
        while self.credit > 0 {
            requests.push((self.offset, CHUNK_SIZE as u64));
            self.offset += CHUNK_SIZE as u64;
            self.credit -= 1;
        }
        requests
    }

    /// Account one reply: refund its credit and tally the payload.
    pub fn on_reply(&mut self, len: usize) {
        debug_assert!(self.credit < self.pipeline);
        self.credit += 1;
        self.chunks_received += 1;
        self.bytes_received += len as u64;
    }

    /// Remaining credit.
    #[must_use]
    pub fn credit(&self) -> usize {
        self.credit
    }

    /// Requests currently in flight.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pipeline - self.credit
    }

    /// Replies accounted so far.
    #[must_use]
    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    /// Payload bytes accounted so far.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

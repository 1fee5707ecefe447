//! Payload fragmentation and reassembly.
//!
//! A GATT characteristic carries at most one transmission unit per operation
//! (20 bytes unless the link negotiated a larger MTU). Payloads are cut into
//! unit-sized chunks on the way out and concatenated on the way in.
//!
//! There is no length prefix and no terminator at this layer. The transport
//! decides when a sequence of chunks is complete: a single read or
//! notification value is always treated as one whole payload.
//!
//! # Example
//!
//! ```
//! use gattlink::protocol::{reassemble, split};
//!
//! let payload = vec![7u8; 45];
//! let chunks = split(&payload, 20);
//! let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
//! assert_eq!(sizes, vec![20, 20, 5]);
//! assert_eq!(reassemble(&chunks), payload);
//! ```

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Default transmission unit: the 23-byte default ATT MTU minus the 3-byte
/// ATT header.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// ATT header overhead subtracted from a negotiated MTU.
pub const ATT_HEADER_SIZE: usize = 3;

/// Split a payload into chunks of at most `max_chunk` bytes.
///
/// Produces `ceil(len / max_chunk)` chunks, all `max_chunk` long except
/// possibly the last. An empty payload yields no chunks. A `max_chunk` of 0
/// is treated as 1.
pub fn split(payload: &[u8], max_chunk: usize) -> Vec<Bytes> {
    let max_chunk = max_chunk.max(1);
    let buf = Bytes::copy_from_slice(payload);

    (0..buf.len())
        .step_by(max_chunk)
        .map(|start| buf.slice(start..(start + max_chunk).min(buf.len())))
        .collect()
}

/// Concatenate chunks in the order given.
pub fn reassemble<T: AsRef<[u8]>>(chunks: &[T]) -> Bytes {
    let total = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out.freeze()
}

/// Chunk size for a negotiated MTU.
pub fn chunk_size_for_mtu(mtu: u16) -> usize {
    (mtu as usize).saturating_sub(ATT_HEADER_SIZE).max(1)
}

/// Ordered chunks belonging to exactly one in-flight payload.
///
/// Outbound, it is filled with [`FragmentQueue::from_payload`] and consumed
/// with [`FragmentQueue::pop_front`]. Inbound, chunks are pushed as they
/// arrive and [`FragmentQueue::drain`] yields the reassembled payload.
#[derive(Debug, Clone, Default)]
pub struct FragmentQueue {
    chunks: VecDeque<Bytes>,
    total_bytes: usize,
}

impl FragmentQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue holding `payload` split into `max_chunk`-sized chunks.
    pub fn from_payload(payload: &[u8], max_chunk: usize) -> Self {
        let chunks: VecDeque<Bytes> = split(payload, max_chunk).into();
        Self {
            total_bytes: payload.len(),
            chunks,
        }
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: Bytes) {
        self.total_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Take the next chunk to transmit.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }

    /// Number of chunks still queued.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes this queue was created with or has received.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Discard all queued chunks.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    /// Reassemble everything queued and leave the queue empty.
    pub fn drain(&mut self) -> Bytes {
        let chunks: Vec<Bytes> = self.chunks.drain(..).collect();
        self.total_bytes = 0;
        reassemble(&chunks)
    }
}

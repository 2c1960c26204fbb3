//! Fixed-capacity ring buffer of decoded PCM chunks
//!
//! Sits between a decoder (writer) and the sound that feeds its voice
//! (reader). The initial load may run on a loader thread while the owning
//! thread drives other sounds, so every operation takes the internal lock.
//! No call blocks beyond that lock: a full or empty buffer is reported to the
//! caller, who retries on a later tick.

use super::types::PcmChunk;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

/// Ring buffer statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    pub occupied: usize,
    /// Chunks accepted since creation
    pub total_written: u64,
    /// Writes refused because the buffer was full
    pub rejected_writes: u64,
}

struct Inner {
    chunks: HeapRb<PcmChunk>,
    total_written: u64,
    rejected_writes: u64,
}

/// Chunk ring buffer shared by a decoder and its sound
pub struct ChunkRingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ChunkRingBuffer {
    /// Create a ring buffer holding `capacity` chunks (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating chunk ring buffer with capacity {}", capacity);
        Self {
            inner: Mutex::new(Inner {
                chunks: HeapRb::new(capacity),
                total_written: 0,
                rejected_writes: 0,
            }),
            capacity,
        }
    }

    /// Store a chunk in the next free slot
    ///
    /// # Returns
    /// `Err(chunk)` hands the chunk back when the buffer is full.
    pub fn write(&self, chunk: PcmChunk) -> Result<(), PcmChunk> {
        let mut inner = self.inner.lock();
        match inner.chunks.try_push(chunk) {
            Ok(()) => {
                inner.total_written += 1;
                Ok(())
            }
            Err(chunk) => {
                inner.rejected_writes += 1;
                trace!("Chunk ring buffer full, write deferred");
                Err(chunk)
            }
        }
    }

    /// Take the oldest unread chunk
    ///
    /// Returns `None` when empty, and also when the oldest slot carries an
    /// empty payload; such a slot is left in place.
    pub fn next_read(&self) -> Option<PcmChunk> {
        let mut inner = self.inner.lock();
        let populated = match inner.chunks.try_peek() {
            Some(chunk) => !chunk.is_empty(),
            None => return None,
        };
        if !populated {
            debug!("Oldest ring buffer slot has no payload");
            return None;
        }
        inner.chunks.try_pop()
    }

    /// Discard every unread chunk
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.chunks.clear();
        if dropped > 0 {
            trace!("Ring buffer reset dropped {} chunks", dropped);
        }
    }

    /// Number of unread chunks
    pub fn size(&self) -> usize {
        self.inner.lock().chunks.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().chunks.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    pub fn stats(&self) -> RingStats {
        let inner = self.inner.lock();
        RingStats {
            capacity: self.capacity,
            occupied: inner.chunks.occupied_len(),
            total_written: inner.total_written,
            rejected_writes: inner.rejected_writes,
        }
    }
}

impl std::fmt::Debug for ChunkRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkRingBuffer")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}

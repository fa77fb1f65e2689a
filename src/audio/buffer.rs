//! Lock-free ring buffer for PCM chunks
//!
//! Single-producer single-consumer hand-off between the audio callback
//! thread and the measurement loops. Neither side ever blocks: a full
//! buffer drops the chunk, an empty one reports an underrun.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chunk of interleaved little-endian PCM bytes
#[derive(Clone, Debug)]
pub struct PcmChunk {
    pub data: Bytes,
}

impl PcmChunk {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Pack 16-bit samples as little-endian bytes
    pub fn from_i16(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self { data: Bytes::from(data) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lock-free ring buffer for PCM chunks
pub struct RingBuffer {
    queue: ArrayQueue<PcmChunk>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk into the buffer
    /// Returns false if buffer is full (overflow)
    pub fn push(&self, chunk: PcmChunk) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a chunk from the buffer
    /// Returns None if buffer is empty (underrun)
    pub fn pop(&self) -> Option<PcmChunk> {
        match self.queue.pop() {
            Some(chunk) => Some(chunk),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_fifo() {
        let buffer = RingBuffer::new(4);

        assert!(buffer.push(PcmChunk::new(Bytes::from_static(&[1]))));
        assert!(buffer.push(PcmChunk::new(Bytes::from_static(&[2]))));
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.pop().unwrap().data.as_ref(), &[1]);
        assert_eq!(buffer.pop().unwrap().data.as_ref(), &[2]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_and_underrun_counted() {
        let buffer = RingBuffer::new(1);

        assert!(buffer.push(PcmChunk::new(Bytes::from_static(&[1]))));
        assert!(!buffer.push(PcmChunk::new(Bytes::from_static(&[2]))));
        assert_eq!(buffer.overflow_count(), 1);

        buffer.pop();
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_i16_packing_is_little_endian() {
        let chunk = PcmChunk::from_i16(&[1, -2]);
        assert_eq!(chunk.data.as_ref(), &[0x01, 0x00, 0xFE, 0xFF]);
    }
}

//! Frame encoder with a reusable scratch buffer

use bytes::{Bytes, BytesMut};

use super::{encode_into, HEADER_SIZE, SENTINEL_INDEX};

/// Encodes probe frames for one session
///
/// Keeps a scratch buffer so the hot path does not allocate per packet.
pub struct FrameEncoder {
    /// Expected payload length for every frame of the session
    payload_len: usize,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: BytesMut,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl FrameEncoder {
    pub fn new(payload_len: usize) -> Self {
        Self {
            payload_len,
            encode_buffer: BytesMut::with_capacity(HEADER_SIZE + payload_len),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode one frame
    ///
    /// Payloads of the wrong length are truncated or zero-padded so the
    /// frame length stays constant for the session.
    pub fn encode(&mut self, index: u32, timestamp_nanos: i64, payload: &[u8]) -> Bytes {
        self.encode_buffer.clear();

        if payload.len() == self.payload_len {
            encode_into(&mut self.encode_buffer, index, timestamp_nanos, payload);
        } else {
            let take = payload.len().min(self.payload_len);
            encode_into(&mut self.encode_buffer, index, timestamp_nanos, &payload[..take]);
            self.encode_buffer.resize(HEADER_SIZE + self.payload_len, 0);
        }

        let frame = self.encode_buffer.split().freeze();
        self.frames_encoded += 1;
        self.bytes_produced += frame.len() as u64;
        frame
    }

    /// Encode a full-length sentinel frame
    pub fn encode_sentinel(&mut self, timestamp_nanos: i64) -> Bytes {
        self.encode(SENTINEL_INDEX, timestamp_nanos, &[])
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    #[test]
    fn test_frame_length_is_constant() {
        let mut encoder = FrameEncoder::new(16);

        let exact = encoder.encode(1, 10, &[7; 16]);
        let short = encoder.encode(2, 20, &[7; 3]);
        let long = encoder.encode(3, 30, &[7; 40]);

        assert_eq!(exact.len(), 28);
        assert_eq!(short.len(), 28);
        assert_eq!(long.len(), 28);

        let padded = decode(&short).unwrap();
        assert_eq!(&padded.payload[..3], &[7, 7, 7]);
        assert!(padded.payload[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sentinel_is_full_length() {
        let mut encoder = FrameEncoder::new(8);
        let frame = encoder.encode_sentinel(99);

        assert_eq!(frame.len(), encoder.frame_len());
        assert!(decode(&frame).unwrap().is_sentinel());
    }

    #[test]
    fn test_stats_accumulate() {
        let mut encoder = FrameEncoder::new(4);
        encoder.encode(1, 0, &[0; 4]);
        encoder.encode(2, 0, &[0; 4]);

        let stats = encoder.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.bytes_produced, 32);
    }
}

//! Probe packet framing
//!
//! Every probe packet is a fixed-length frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬──────────────────────┐
//! │ Sequence index   │ Timestamp (ns)       │ Payload              │
//! │ (4 bytes, BE u32)│ (8 bytes, BE i64)    │ (fixed per session)  │
//! └──────────────────┴──────────────────────┴──────────────────────┘
//! ```
//!
//! Sequence index 0 is the termination sentinel. A sentinel may arrive as a
//! bare 4-byte index, so [`is_sentinel`] only looks at the first four bytes.

pub mod decoder;
pub mod encoder;

pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the sequence index field
pub const INDEX_SIZE: usize = 4;

/// Header size: sequence index + timestamp
pub const HEADER_SIZE: usize = INDEX_SIZE + 8;

/// Sequence index reserved for the termination sentinel
pub const SENTINEL_INDEX: u32 = 0;

/// A decoded probe packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_index: u32,
    /// Wall-clock send time in nanoseconds since the UNIX epoch
    pub timestamp_nanos: i64,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_index: u32, timestamp_nanos: i64, payload: Bytes) -> Self {
        Self {
            sequence_index,
            timestamp_nanos,
            payload,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sequence_index == SENTINEL_INDEX
    }

    /// Total encoded length of this packet
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode `index || timestamp || payload` into a new frame
pub fn encode(index: u32, timestamp_nanos: i64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_into(&mut buf, index, timestamp_nanos, payload);
    buf.freeze()
}

pub(crate) fn encode_into(buf: &mut BytesMut, index: u32, timestamp_nanos: i64, payload: &[u8]) {
    buf.reserve(HEADER_SIZE + payload.len());
    buf.put_u32(index);
    buf.put_i64(timestamp_nanos);
    buf.put_slice(payload);
}

/// Decode a frame. Anything past the header is taken as payload.
pub fn decode(frame: &[u8]) -> Result<Packet, ProtocolError> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort {
            len: frame.len(),
            needed: HEADER_SIZE,
        });
    }

    let mut index = [0u8; INDEX_SIZE];
    index.copy_from_slice(&frame[..INDEX_SIZE]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&frame[INDEX_SIZE..HEADER_SIZE]);

    Ok(Packet {
        sequence_index: u32::from_be_bytes(index),
        timestamp_nanos: i64::from_be_bytes(timestamp),
        payload: Bytes::copy_from_slice(&frame[HEADER_SIZE..]),
    })
}

/// Read the sequence index without requiring a full header
pub fn peek_index(frame: &[u8]) -> Option<u32> {
    let bytes: [u8; INDEX_SIZE] = frame.get(..INDEX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// True if the frame carries the termination sentinel
pub fn is_sentinel(frame: &[u8]) -> bool {
    peek_index(frame) == Some(SENTINEL_INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_layout_is_big_endian() {
        let frame = encode(0x0102_0304, 0x0A0B_0C0D_0E0F_1011, &[0xFF, 0xEE]);

        assert_eq!(
            frame.as_ref(),
            &[
                0x01, 0x02, 0x03, 0x04, // index
                0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, // timestamp
                0xFF, 0xEE, // payload
            ]
        );
    }

    #[test]
    fn test_short_frame_rejected() {
        let err = decode(&[0, 0, 0, 1, 0, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooShort { len: 6, needed: 12 });
    }

    #[test]
    fn test_header_only_frame_has_empty_payload() {
        let packet = decode(&encode(9, 1, &[])).unwrap();
        assert_eq!(packet.sequence_index, 9);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_truncated_sentinel_detected() {
        assert!(is_sentinel(&[0, 0, 0, 0]));
        assert!(is_sentinel(&encode(SENTINEL_INDEX, 123, &[0; 32])));
        assert!(!is_sentinel(&[0, 0, 0, 1]));
        assert!(!is_sentinel(&[0, 0]));
        assert_eq!(peek_index(&[0, 0, 1]), None);
    }

    #[test]
    fn test_negative_timestamp_survives() {
        let packet = decode(&encode(3, -42, b"abc")).unwrap();
        assert_eq!(packet.timestamp_nanos, -42);
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(
            index in any::<u32>(),
            timestamp in any::<i64>(),
            payload in proptest::collection::vec(any::<u8>(), 0..1500),
        ) {
            let frame = encode(index, timestamp, &payload);
            prop_assert_eq!(frame.len(), HEADER_SIZE + payload.len());

            let packet = decode(&frame).unwrap();
            prop_assert_eq!(packet.sequence_index, index);
            prop_assert_eq!(packet.timestamp_nanos, timestamp);
            prop_assert_eq!(packet.payload.as_ref(), payload.as_slice());
        }
    }
}

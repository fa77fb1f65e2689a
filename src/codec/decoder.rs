//! Frame decoder with drop accounting

use super::{decode, is_sentinel, Packet, SENTINEL_INDEX};
use crate::error::ProtocolError;

/// Outcome of decoding one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A measurement packet
    Packet(Packet),
    /// The termination sentinel. `timestamp_nanos` is `None` when only the
    /// bare index arrived.
    Sentinel { timestamp_nanos: Option<i64> },
}

/// Stateful decoder for the receiving side of a session
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Frames decoded
    frames_decoded: u64,
    /// Frames dropped because they were too short
    frames_dropped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a datagram, recognising truncated sentinels
    pub fn decode(&mut self, frame: &[u8]) -> Result<Decoded, ProtocolError> {
        match decode(frame) {
            Ok(packet) if packet.sequence_index == SENTINEL_INDEX => {
                self.frames_decoded += 1;
                Ok(Decoded::Sentinel {
                    timestamp_nanos: Some(packet.timestamp_nanos),
                })
            }
            Ok(packet) => {
                self.frames_decoded += 1;
                Ok(Decoded::Packet(packet))
            }
            Err(_) if is_sentinel(frame) => {
                self.frames_decoded += 1;
                Ok(Decoded::Sentinel {
                    timestamp_nanos: None,
                })
            }
            Err(e) => {
                self.frames_dropped += 1;
                Err(e)
            }
        }
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_dropped: self.frames_dropped,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn test_bare_index_sentinel() {
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.decode(&[0, 0, 0, 0]).unwrap();
        assert_eq!(decoded, Decoded::Sentinel { timestamp_nanos: None });
    }

    #[test]
    fn test_full_sentinel_keeps_timestamp() {
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.decode(&encode(0, 77, &[0; 10])).unwrap();
        assert_eq!(decoded, Decoded::Sentinel { timestamp_nanos: Some(77) });
    }

    #[test]
    fn test_short_frames_counted_as_dropped() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.decode(&[0, 0, 0, 5, 1]).is_err());
        assert!(decoder.decode(&[]).is_err());
        assert!(matches!(
            decoder.decode(&encode(5, 1, &[1, 2])),
            Ok(Decoded::Packet(_))
        ));

        let stats = decoder.stats();
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.frames_decoded, 1);
    }
}

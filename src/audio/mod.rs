//! Audio subsystem module
//!
//! The measurement loops only see [`PayloadSource`] and [`PayloadSink`].
//! Without live audio the sender carries zero-filled payloads and nothing
//! is played back.

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;

use bytes::{Bytes, BytesMut};

use crate::config::{AudioConfig, SessionConfig};
use crate::error::AudioError;

pub use buffer::{PcmChunk, RingBuffer};
pub use capture::{AudioCapture, CaptureSource};
pub use device::{list_devices, AudioDeviceInfo};
pub use playback::{AudioPlayback, PlaybackSink};

/// Supplies packet payloads to the sender
pub trait PayloadSource: Send {
    /// Return exactly `len` bytes without blocking
    fn next_payload(&mut self, len: usize) -> Bytes;

    /// Payloads so far that had to be completed with silence
    fn padded_payloads(&self) -> u64 {
        0
    }
}

/// Consumes received payloads
pub trait PayloadSink: Send {
    fn play(&mut self, pcm: &[u8]) -> Result<(), AudioError>;
}

/// Zero-filled filler payload
#[derive(Debug, Default)]
pub struct ZeroPayload {
    zeros: Bytes,
}

impl ZeroPayload {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadSource for ZeroPayload {
    fn next_payload(&mut self, len: usize) -> Bytes {
        if self.zeros.len() != len {
            self.zeros = BytesMut::zeroed(len).freeze();
        }
        self.zeros.clone()
    }
}

/// Payload source for a session: microphone capture or zeros
pub fn open_source(
    session: &SessionConfig,
    audio: &AudioConfig,
) -> Result<Box<dyn PayloadSource>, AudioError> {
    if !session.stream_live_audio {
        return Ok(Box::new(ZeroPayload::new()));
    }

    let source = CaptureSource::open(
        audio.input_device.as_deref(),
        session.sample_rate,
        session.channels,
        session.frame_size,
        audio.ring_capacity,
    )?;
    Ok(Box::new(source))
}

/// Playback sink for a session, None unless live audio is enabled
pub fn open_sink(
    session: &SessionConfig,
    audio: &AudioConfig,
) -> Result<Option<Box<dyn PayloadSink>>, AudioError> {
    if !session.stream_live_audio {
        return Ok(None);
    }

    let sink = PlaybackSink::open(
        audio.output_device.as_deref(),
        session.sample_rate,
        session.channels,
        session.frame_size,
        audio.ring_capacity,
    )?;
    Ok(Some(Box::new(sink)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_payload_sizes() {
        let mut source = ZeroPayload::new();
        assert_eq!(source.next_payload(1012).len(), 1012);
        assert_eq!(source.next_payload(0).len(), 0);
        let payload = source.next_payload(64);
        assert_eq!(payload.len(), 64);
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_filler_session_needs_no_device() {
        let session = SessionConfig::default();
        let audio = AudioConfig::default();
        assert!(open_source(&session, &audio).is_ok());
        assert!(open_sink(&session, &audio).unwrap().is_none());
    }
}

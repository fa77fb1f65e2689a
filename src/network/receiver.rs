//! Probe receiver loop
//!
//! Turns each echoed frame into a [`SampleRecord`] until the sentinel
//! arrives. There is no receive timeout: without a peer the loop waits
//! forever.

use std::sync::Arc;
use tokio::net::UdpSocket;

use crate::audio::PayloadSink;
use crate::clock::now_nanos;
use crate::codec::decoder::{Decoded, DecoderStats};
use crate::codec::FrameDecoder;
use crate::config::MAX_DATAGRAM_SIZE;
use crate::error::{NetworkError, Result};
use crate::network::udp::is_transient_recv_error;
use crate::stats::SampleRecord;

/// Sample log and accounting handed back when the receiver stops
#[derive(Debug, Clone, Default)]
pub struct ReceiverOutput {
    /// One record per packet, in arrival order
    pub samples: Vec<SampleRecord>,
    /// Frames too short to carry a header
    pub dropped_frames: u64,
    /// Decoded frames whose length differs from the configured frame size
    pub mismatched_frames: u64,
    pub decoder_stats: DecoderStats,
}

/// Latency and jitter of one packet
///
/// Latency is half the measured round trip; jitter is the absolute change
/// from the previous packet's latency. The timestamp comes off the wire, so
/// the difference is taken in i128 and cannot overflow.
pub fn measure(received_at_nanos: i64, sent_nanos: i64, previous_latency: f64) -> (f64, f64) {
    let latency = (i128::from(received_at_nanos) - i128::from(sent_nanos)) as f64 * 1e-9 / 2.0;
    (latency, (latency - previous_latency).abs())
}

pub struct ReceiverLoop {
    socket: Arc<UdpSocket>,
    decoder: FrameDecoder,
    sink: Option<Box<dyn PayloadSink>>,
    frame_len: usize,
    verbose: bool,
}

impl ReceiverLoop {
    /// `frame_len` is the datagram size the sender was configured with
    pub fn new(
        socket: Arc<UdpSocket>,
        sink: Option<Box<dyn PayloadSink>>,
        frame_len: usize,
        verbose: bool,
    ) -> Self {
        Self {
            socket,
            decoder: FrameDecoder::new(),
            sink,
            frame_len,
            verbose,
        }
    }

    /// Receive until the sentinel, returning the owned sample log
    pub async fn run(mut self) -> Result<ReceiverOutput> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut samples = Vec::new();
        let mut previous_latency = 0.0;
        let mut dropped_frames = 0u64;
        let mut mismatched_frames = 0u64;

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_transient_recv_error(&e) => {
                    tracing::debug!("Ignoring receive error: {}", e);
                    continue;
                }
                Err(e) => return Err(NetworkError::ReceiveFailed(e).into()),
            };
            let received_at = now_nanos();

            let packet = match self.decoder.decode(&buf[..len]) {
                Ok(Decoded::Packet(packet)) => packet,
                Ok(Decoded::Sentinel { .. }) => {
                    tracing::info!("Sentinel received from {}", from);
                    break;
                }
                Err(e) => {
                    dropped_frames += 1;
                    if self.verbose {
                        tracing::warn!("Dropping frame from {}: {}", from, e);
                    } else {
                        tracing::debug!("Dropping frame from {}: {}", from, e);
                    }
                    continue;
                }
            };

            // Still measured; only the size is off
            if len != self.frame_len {
                mismatched_frames += 1;
                if self.verbose {
                    tracing::warn!(
                        "Packet {} from {} is {} bytes, expected {}",
                        packet.sequence_index,
                        from,
                        len,
                        self.frame_len
                    );
                } else {
                    tracing::debug!(
                        "Packet {} from {} is {} bytes, expected {}",
                        packet.sequence_index,
                        from,
                        len,
                        self.frame_len
                    );
                }
            }

            let (latency, jitter) = measure(received_at, packet.timestamp_nanos, previous_latency);
            previous_latency = latency;

            if self.verbose {
                tracing::info!(
                    "Packet {}: latency {:.6} s, jitter {:.6} s, {} bytes",
                    packet.sequence_index,
                    latency,
                    jitter,
                    len
                );
            }

            samples.push(SampleRecord {
                sequence_index: packet.sequence_index,
                latency_secs: latency,
                jitter_secs: jitter,
                received_at_nanos: received_at,
                packet_size_bytes: len,
            });

            if let Some(sink) = self.sink.as_mut() {
                if let Err(e) = sink.play(&packet.payload) {
                    tracing::debug!("Playback of packet {} failed: {}", packet.sequence_index, e);
                }
            }
        }

        tracing::info!(
            "Receiver closed: {} samples, {} frames dropped, {} off-size",
            samples.len(),
            dropped_frames,
            mismatched_frames
        );

        Ok(ReceiverOutput {
            samples,
            dropped_frames,
            mismatched_frames,
            decoder_stats: self.decoder.stats(),
        })
    }
}

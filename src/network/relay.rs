//! Relay (server role)
//!
//! The inbound task records how long each probe spent in flight as seen by
//! the relay clock and queues `(index, dwell)` entries. The outbound task
//! pops them strictly in arrival order and echoes each index back with a
//! timestamp shifted by the dwell, so the relay's own processing time drops
//! out of the client's measurement.
//!
//! Correlation is by arrival order only. If inbound and outbound fall out of
//! step the dwell of one packet is applied to another.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::audio::{PayloadSink, PayloadSource};
use crate::clock::now_nanos;
use crate::codec::decoder::Decoded;
use crate::codec::{FrameDecoder, FrameEncoder, SENTINEL_INDEX};
use crate::config::MAX_DATAGRAM_SIZE;
use crate::error::{Error, NetworkError, Result};
use crate::network::udp::{is_transient_recv_error, send_frame};

/// Dwell compensation for one inbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOffsetEntry {
    pub sequence_index: u32,
    /// Sender timestamp minus relay arrival time, saturated to the i64 range
    pub dwell_delta_nanos: i64,
}

impl RelayOffsetEntry {
    pub fn is_sentinel(&self) -> bool {
        self.sequence_index == SENTINEL_INDEX
    }
}

/// Hand-off queue between the two relay tasks
pub fn relay_queue() -> (
    UnboundedSender<RelayOffsetEntry>,
    UnboundedReceiver<RelayOffsetEntry>,
) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayInboundSummary {
    /// Entries queued, sentinel included
    pub queued: u64,
    pub dropped_frames: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutboundSummary {
    /// Replies sent, sentinel included
    pub replies_sent: u64,
    pub bytes_sent: u64,
}

/// Receives probes and queues their dwell deltas
pub struct RelayInbound {
    socket: Arc<UdpSocket>,
    decoder: FrameDecoder,
    queue: UnboundedSender<RelayOffsetEntry>,
    sink: Option<Box<dyn PayloadSink>>,
    verbose: bool,
}

impl RelayInbound {
    pub fn new(
        socket: Arc<UdpSocket>,
        queue: UnboundedSender<RelayOffsetEntry>,
        sink: Option<Box<dyn PayloadSink>>,
        verbose: bool,
    ) -> Self {
        Self {
            socket,
            decoder: FrameDecoder::new(),
            queue,
            sink,
            verbose,
        }
    }

    pub async fn run(mut self) -> Result<RelayInboundSummary> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut summary = RelayInboundSummary::default();

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_transient_recv_error(&e) => {
                    tracing::debug!("Ignoring receive error: {}", e);
                    continue;
                }
                Err(e) => return Err(NetworkError::ReceiveFailed(e).into()),
            };
            let arrival = now_nanos();

            let entry = match self.decoder.decode(&buf[..len]) {
                Ok(Decoded::Packet(packet)) => {
                    if let Some(sink) = self.sink.as_mut() {
                        if let Err(e) = sink.play(&packet.payload) {
                            tracing::debug!(
                                "Playback of packet {} failed: {}",
                                packet.sequence_index,
                                e
                            );
                        }
                    }
                    RelayOffsetEntry {
                        sequence_index: packet.sequence_index,
                        dwell_delta_nanos: packet.timestamp_nanos.saturating_sub(arrival),
                    }
                }
                Ok(Decoded::Sentinel { timestamp_nanos }) => RelayOffsetEntry {
                    sequence_index: SENTINEL_INDEX,
                    dwell_delta_nanos: timestamp_nanos.map_or(0, |ts| ts.saturating_sub(arrival)),
                },
                Err(e) => {
                    summary.dropped_frames += 1;
                    if self.verbose {
                        tracing::warn!("Dropping frame from {}: {}", from, e);
                    } else {
                        tracing::debug!("Dropping frame from {}: {}", from, e);
                    }
                    continue;
                }
            };

            if self.verbose {
                tracing::info!(
                    "Relay in: packet {} from {}, dwell {} ns",
                    entry.sequence_index,
                    from,
                    entry.dwell_delta_nanos
                );
            }

            // The outbound task may already be gone after a send failure
            if self.queue.send(entry).is_err() {
                return Err(Error::Task("relay outbound task stopped".into()));
            }
            summary.queued += 1;

            if entry.is_sentinel() {
                tracing::info!("Relay inbound: sentinel received from {}", from);
                break;
            }
        }

        Ok(summary)
    }
}

/// Echoes queued entries back to the peer
pub struct RelayOutbound {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    queue: UnboundedReceiver<RelayOffsetEntry>,
    encoder: FrameEncoder,
    source: Box<dyn PayloadSource>,
    verbose: bool,
}

impl RelayOutbound {
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        queue: UnboundedReceiver<RelayOffsetEntry>,
        payload_len: usize,
        source: Box<dyn PayloadSource>,
        verbose: bool,
    ) -> Self {
        Self {
            socket,
            peer,
            queue,
            encoder: FrameEncoder::new(payload_len),
            source,
            verbose,
        }
    }

    pub async fn run(mut self) -> Result<RelayOutboundSummary> {
        let mut summary = RelayOutboundSummary::default();

        loop {
            let payload = self.source.next_payload(self.encoder.payload_len());
            let entry = self
                .queue
                .recv()
                .await
                .ok_or(Error::CorrelationStarvation)?;

            let reply_ts = now_nanos().saturating_add(entry.dwell_delta_nanos);
            let frame = self.encoder.encode(entry.sequence_index, reply_ts, &payload);
            let sent = send_frame(&self.socket, &frame, self.peer).await?;
            summary.replies_sent += 1;
            summary.bytes_sent += sent as u64;

            if self.verbose {
                tracing::info!(
                    "Relay out: packet {} to {}, timestamp {} ns",
                    entry.sequence_index,
                    self.peer,
                    reply_ts
                );
            }

            if entry.is_sentinel() {
                tracing::info!("Relay outbound: sentinel sent to {}", self.peer);
                break;
            }
        }

        tracing::debug!("Relay outbound encoder: {:?}", self.encoder.stats());
        Ok(summary)
    }
}

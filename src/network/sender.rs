//! Probe sender loop
//!
//! Emits one timestamped frame per audio period until the session duration
//! or the packet budget is exhausted, then closes the session with a
//! sentinel frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::audio::PayloadSource;
use crate::clock::now_nanos;
use crate::codec::FrameEncoder;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::network::udp::send_frame;
use crate::pacing::Pacer;

/// Sender lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Active,
    Terminating,
    Closed,
}

/// What the sender put on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SenderSummary {
    /// Measurement packets, sentinel excluded
    pub packets_sent: u64,
    /// Bytes of all frames, sentinel included
    pub bytes_sent: u64,
    pub elapsed: Duration,
    /// Payloads the source completed with silence
    pub padded_payloads: u64,
}

pub struct SenderLoop {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    encoder: FrameEncoder,
    pacer: Pacer,
    source: Box<dyn PayloadSource>,
    running_duration: Duration,
    total_packets: f64,
    verbose: bool,
    state: SenderState,
}

impl SenderLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        config: &SessionConfig,
        source: Box<dyn PayloadSource>,
    ) -> Self {
        Self {
            socket,
            peer,
            encoder: FrameEncoder::new(config.payload_len()),
            pacer: Pacer::from_config(config),
            source,
            running_duration: config.running_duration(),
            total_packets: config.total_packets(),
            verbose: config.verbose,
            state: SenderState::Active,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Run until the budget is spent and the sentinel is out
    pub async fn run(mut self) -> Result<SenderSummary> {
        tracing::info!(
            "Sending {}-byte frames to {} every {:?}",
            self.encoder.frame_len(),
            self.peer,
            self.pacer.period()
        );

        self.pacer.restart();
        let mut index: u32 = 1;
        let mut packets_sent: u64 = 0;
        let mut bytes_sent: u64 = 0;

        while self.state == SenderState::Active {
            if self.pacer.elapsed() > self.running_duration || index as f64 > self.total_packets {
                self.state = SenderState::Terminating;
                break;
            }

            let payload = self.source.next_payload(self.encoder.payload_len());
            let timestamp = now_nanos();
            let frame = self.encoder.encode(index, timestamp, &payload);
            let sent = send_frame(&self.socket, &frame, self.peer).await?;

            if self.verbose {
                tracing::info!("Sent packet {} at {} ns ({} bytes)", index, timestamp, sent);
            } else {
                tracing::trace!("Sent packet {} at {} ns ({} bytes)", index, timestamp, sent);
            }

            packets_sent += 1;
            bytes_sent += sent as u64;
            index = index.wrapping_add(1).max(1);

            let delay = self.pacer.next_delay(packets_sent);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let sentinel = self.encoder.encode_sentinel(now_nanos());
        bytes_sent += send_frame(&self.socket, &sentinel, self.peer).await? as u64;
        self.state = SenderState::Closed;

        let summary = SenderSummary {
            packets_sent,
            bytes_sent,
            elapsed: self.pacer.elapsed(),
            padded_payloads: self.source.padded_payloads(),
        };
        tracing::info!(
            "Sender closed: {} packets, {} bytes in {:.3} s, {} padded with silence",
            summary.packets_sent,
            summary.bytes_sent,
            summary.elapsed.as_secs_f64(),
            summary.padded_payloads
        );
        tracing::debug!("Sender encoder: {:?}", self.encoder.stats());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ZeroPayload;
    use crate::codec::{decode, is_sentinel};
    use crate::config::PacingPolicy;
    use crate::error::{Error, NetworkError};
    use crate::network::udp::bind_socket;
    use bytes::{Bytes, BytesMut};
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    /// Source whose capture never keeps up: every payload is padded
    #[derive(Default)]
    struct StarvedSource {
        served: u64,
    }

    impl PayloadSource for StarvedSource {
        fn next_payload(&mut self, len: usize) -> Bytes {
            self.served += 1;
            BytesMut::zeroed(len).freeze()
        }

        fn padded_payloads(&self) -> u64 {
            self.served
        }
    }

    #[tokio::test]
    async fn test_count_bounded_run_ends_with_sentinel() {
        let config = SessionConfig {
            packet_count: Some(5),
            pacing: PacingPolicy::Adaptive,
            ..Default::default()
        };
        let sink = bind_socket(localhost(), 1 << 16).unwrap();
        let socket = Arc::new(bind_socket(localhost(), 1 << 16).unwrap());

        let sender = SenderLoop::new(
            socket,
            sink.local_addr().unwrap(),
            &config,
            Box::new(ZeroPayload::new()),
        );
        assert_eq!(sender.state(), SenderState::Active);
        let summary = sender.run().await.unwrap();

        assert_eq!(summary.packets_sent, 5);
        assert_eq!(summary.bytes_sent, 6 * config.frame_len() as u64);
        assert_eq!(summary.padded_payloads, 0);

        let mut buf = vec![0u8; 2048];
        for expected in 1..=5u32 {
            let (n, _) = sink.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, config.frame_len());
            let packet = decode(&buf[..n]).unwrap();
            assert_eq!(packet.sequence_index, expected);
            assert!(packet.payload.iter().all(|&b| b == 0));
        }
        let (n, _) = sink.recv_from(&mut buf).await.unwrap();
        assert!(is_sentinel(&buf[..n]));
        assert_eq!(n, config.frame_len());
    }

    #[tokio::test]
    async fn test_duration_bound_stops_early() {
        // 1000 packets budgeted but only 50 ms to send them
        let config = SessionConfig {
            packet_count: Some(1000),
            running_duration_secs: 0.05,
            ..Default::default()
        };
        let sink = bind_socket(localhost(), 1 << 20).unwrap();
        let socket = Arc::new(bind_socket(localhost(), 1 << 16).unwrap());

        let summary = SenderLoop::new(
            socket,
            sink.local_addr().unwrap(),
            &config,
            Box::new(ZeroPayload::new()),
        )
        .run()
        .await
        .unwrap();

        assert!(summary.packets_sent > 0);
        assert!(summary.packets_sent < 1000);
        assert!(summary.elapsed >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_summary_reports_padded_payloads() {
        let config = SessionConfig {
            packet_count: Some(4),
            pacing: PacingPolicy::Adaptive,
            ..Default::default()
        };
        let sink = bind_socket(localhost(), 1 << 16).unwrap();
        let socket = Arc::new(bind_socket(localhost(), 1 << 16).unwrap());

        let summary = SenderLoop::new(
            socket,
            sink.local_addr().unwrap(),
            &config,
            Box::new(StarvedSource::default()),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.packets_sent, 4);
        assert_eq!(summary.padded_payloads, 4);
    }

    #[tokio::test]
    async fn test_persistent_send_error_aborts_run() {
        // Broadcast without SO_BROADCAST is refused with a non-transient error
        let config = SessionConfig {
            packet_count: Some(3),
            pacing: PacingPolicy::Adaptive,
            ..Default::default()
        };
        let socket = Arc::new(bind_socket(localhost(), 1 << 16).unwrap());
        let peer: SocketAddr = "255.255.255.255:9".parse().unwrap();

        let sender = SenderLoop::new(socket, peer, &config, Box::new(ZeroPayload::new()));
        let result = sender.run().await;

        match result {
            Err(Error::Network(NetworkError::SendFailed { peer: failed, .. })) => {
                assert_eq!(failed, peer)
            }
            other => panic!("expected a send failure, got {other:?}"),
        }
    }
}

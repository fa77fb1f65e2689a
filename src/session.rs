//! Session controller
//!
//! Resolves the mode once, binds sockets, opens the audio collaborators and
//! runs the loops for that role. When one loop fails its sibling is aborted.
//! Measuring roles finish by aggregating the sample log and, if asked,
//! writing it out as CSV.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::audio::{self, PayloadSink, PayloadSource};
use crate::config::{AppConfig, Mode, SessionConfig};
use crate::error::{Error, Result};
use crate::network::relay::{relay_queue, RelayInboundSummary, RelayOutboundSummary};
use crate::network::{bind_socket, ReceiverLoop, RelayInbound, RelayOutbound, SenderLoop};
use crate::network::{ReceiverOutput, SenderSummary};
use crate::record::{CsvRecordWriter, RecordSink};
use crate::stats::{aggregate, SampleRecord, SessionReport};

/// Result of a client or loopback session
#[derive(Debug, Clone)]
pub struct MeasurementOutcome {
    pub sender: SenderSummary,
    pub samples: Vec<SampleRecord>,
    pub dropped_frames: u64,
    /// Frames whose length differed from the configured frame size
    pub mismatched_frames: u64,
    pub report: SessionReport,
    /// Where the sample log was written, if it was
    pub log_path: Option<PathBuf>,
}

/// Result of a relay session
#[derive(Debug, Clone, Copy)]
pub struct RelayOutcome {
    pub inbound: RelayInboundSummary,
    pub outbound: RelayOutboundSummary,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Measured(MeasurementOutcome),
    Relayed(RelayOutcome),
}

/// One measurement session for the configured role
pub struct Session {
    config: AppConfig,
}

impl Session {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.session.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config.session
    }

    /// Bind, run every loop of the role to completion, and summarize
    pub async fn run(self) -> Result<SessionOutcome> {
        let session = &self.config.session;
        let recv_buffer = session.recv_buffer_size();

        tracing::info!(
            "Starting {:?} session: {} Hz, {} frames, {} ch, {}-bit, {}-byte frames",
            session.mode,
            session.sample_rate,
            session.frame_size,
            session.channels,
            session.bit_resolution,
            session.frame_len()
        );

        match session.mode {
            Mode::Client => {
                let socket = bind_socket(session.local_addr, recv_buffer)?;
                let source = audio::open_source(session, &self.config.audio)?;
                let sink = audio::open_sink(session, &self.config.audio)?;
                run_client(session, socket, source, sink)
                    .await
                    .map(SessionOutcome::Measured)
            }
            Mode::Loopback => {
                let receiver_socket = bind_socket(session.local_addr, recv_buffer)?;
                let sender_socket = bind_socket(ephemeral_addr(session.local_addr), recv_buffer)?;
                let source = audio::open_source(session, &self.config.audio)?;
                let sink = audio::open_sink(session, &self.config.audio)?;
                run_loopback(session, receiver_socket, sender_socket, source, sink)
                    .await
                    .map(SessionOutcome::Measured)
            }
            Mode::Server => {
                let socket = bind_socket(session.local_addr, recv_buffer)?;
                let source = audio::open_source(session, &self.config.audio)?;
                let sink = audio::open_sink(session, &self.config.audio)?;
                run_relay(session, socket, source, sink)
                    .await
                    .map(SessionOutcome::Relayed)
            }
        }
    }
}

/// Client role: sender and receiver share one socket facing the relay
pub async fn run_client(
    config: &SessionConfig,
    socket: UdpSocket,
    source: Box<dyn PayloadSource>,
    sink: Option<Box<dyn PayloadSink>>,
) -> Result<MeasurementOutcome> {
    let socket = Arc::new(socket);
    tracing::info!(
        "Client on {} probing relay at {}",
        socket.local_addr()?,
        config.peer_addr
    );

    let sender = SenderLoop::new(socket.clone(), config.peer_addr, config, source);
    let receiver = ReceiverLoop::new(socket, sink, config.frame_len(), config.verbose);
    measure(config, sender, receiver).await
}

/// Loopback role: the sender probes this process's own receiver
pub async fn run_loopback(
    config: &SessionConfig,
    receiver_socket: UdpSocket,
    sender_socket: UdpSocket,
    source: Box<dyn PayloadSource>,
    sink: Option<Box<dyn PayloadSink>>,
) -> Result<MeasurementOutcome> {
    let target = reachable_addr(receiver_socket.local_addr()?);
    tracing::info!("Loopback session on {}", target);

    let sender = SenderLoop::new(Arc::new(sender_socket), target, config, source);
    let receiver = ReceiverLoop::new(
        Arc::new(receiver_socket),
        sink,
        config.frame_len(),
        config.verbose,
    );
    measure(config, sender, receiver).await
}

/// Server role: echo probes back to the configured peer
pub async fn run_relay(
    config: &SessionConfig,
    socket: UdpSocket,
    source: Box<dyn PayloadSource>,
    sink: Option<Box<dyn PayloadSink>>,
) -> Result<RelayOutcome> {
    let socket = Arc::new(socket);
    tracing::info!(
        "Relay on {} replying to {}",
        socket.local_addr()?,
        config.peer_addr
    );

    let (tx, rx) = relay_queue();
    let inbound = RelayInbound::new(socket.clone(), tx, sink, config.verbose);
    let outbound = RelayOutbound::new(
        socket,
        config.peer_addr,
        rx,
        config.payload_len(),
        source,
        config.verbose,
    );

    let (inbound, outbound) =
        join_or_abort(tokio::spawn(inbound.run()), tokio::spawn(outbound.run())).await?;
    tracing::info!(
        "Relay finished: {} packets in, {} replies out",
        inbound.queued,
        outbound.replies_sent
    );
    Ok(RelayOutcome { inbound, outbound })
}

async fn measure(
    config: &SessionConfig,
    sender: SenderLoop,
    receiver: ReceiverLoop,
) -> Result<MeasurementOutcome> {
    let (sender, output) =
        join_or_abort(tokio::spawn(sender.run()), tokio::spawn(receiver.run())).await?;
    finish(config, sender, output)
}

/// Aggregate the sample log and persist it when configured
fn finish(
    config: &SessionConfig,
    sender: SenderSummary,
    output: ReceiverOutput,
) -> Result<MeasurementOutcome> {
    let report = aggregate(&output.samples)?;

    let log_path = if config.save_log {
        let path = config.csv_path();
        let mut writer = CsvRecordWriter::create(&path)?;
        writer.append_records(&output.samples)?;
        tracing::info!("Sample log written to {}", path.display());
        Some(path)
    } else {
        None
    };

    Ok(MeasurementOutcome {
        sender,
        samples: output.samples,
        dropped_frames: output.dropped_frames,
        mismatched_frames: output.mismatched_frames,
        report,
        log_path,
    })
}

/// Wait for both tasks; the first failure aborts the other
async fn join_or_abort<A, B>(
    mut first: JoinHandle<Result<A>>,
    mut second: JoinHandle<Result<B>>,
) -> Result<(A, B)> {
    tokio::select! {
        joined = &mut first => match flatten(joined) {
            Ok(a) => Ok((a, flatten(second.await)?)),
            Err(e) => {
                second.abort();
                Err(e)
            }
        },
        joined = &mut second => match flatten(joined) {
            Ok(b) => Ok((flatten(first.await)?, b)),
            Err(e) => {
                first.abort();
                Err(e)
            }
        },
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.map_err(Error::from)?
}

/// Port 0 on the same address family
fn ephemeral_addr(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip(), 0)
}

/// A wildcard bind address is not a valid destination; use loopback instead
fn reachable_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

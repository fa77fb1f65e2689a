//! LAN Audio Probe
//!
//! Measures latency, jitter, bandwidth and loss of a UDP audio link. Run
//! `server` on the far host and `client` on the near one, or `loopback` to
//! probe the local stack alone.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_probe::{
    audio::list_devices,
    config::{AppConfig, Mode, PacingPolicy, SessionConfig},
    session::{Session, SessionOutcome},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Opts {
    #[command(subcommand)]
    command: Command,
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Log every packet
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe a relay and report link statistics
    Client(SessionOpts),
    /// Relay probes back to a client
    Server(SessionOpts),
    /// Probe this host's own UDP stack
    Loopback(SessionOpts),
    /// List audio devices
    Devices,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PacingArg {
    Fixed,
    Adaptive,
}

impl From<PacingArg> for PacingPolicy {
    fn from(arg: PacingArg) -> Self {
        match arg {
            PacingArg::Fixed => PacingPolicy::Fixed,
            PacingArg::Adaptive => PacingPolicy::Adaptive,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct SessionOpts {
    /// Address to bind to
    #[arg(long)]
    local: Option<SocketAddr>,
    /// Address to send probes (or replies) to
    #[arg(long)]
    peer: Option<SocketAddr>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Audio frames per packet
    #[arg(long)]
    frame_size: Option<u32>,
    /// Bits per sample
    #[arg(long)]
    bits: Option<u16>,
    #[arg(long)]
    channels: Option<u16>,
    /// Duration of the test in seconds
    #[arg(long, short)]
    duration: Option<f64>,
    /// Number of packets to send
    #[arg(long, short = 'n')]
    count: Option<u32>,
    #[arg(long, value_enum)]
    pacing: Option<PacingArg>,
    /// Carry live microphone audio and play what comes back
    #[arg(long)]
    live: bool,
    #[arg(long)]
    input_device: Option<String>,
    #[arg(long)]
    output_device: Option<String>,
    /// Write the per-packet log as CSV
    #[arg(long)]
    save_log: bool,
    /// CSV path, default results_<rate>_<frames>_<channels>.csv
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Socket receive buffer in bytes
    #[arg(long)]
    recv_buffer: Option<usize>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SessionOpts {
    fn apply(&self, config: &mut AppConfig) {
        let session = &mut config.session;
        if let Some(local) = self.local {
            session.local_addr = local;
        }
        if let Some(peer) = self.peer {
            session.peer_addr = peer;
        }
        if let Some(rate) = self.sample_rate {
            session.sample_rate = rate;
        }
        if let Some(frames) = self.frame_size {
            session.frame_size = frames;
        }
        if let Some(bits) = self.bits {
            session.bit_resolution = bits;
        }
        if let Some(channels) = self.channels {
            session.channels = channels;
        }
        if let Some(duration) = self.duration {
            session.running_duration_secs = duration;
        }
        if self.count.is_some() {
            session.packet_count = self.count;
        }
        if let Some(pacing) = self.pacing {
            session.pacing = pacing.into();
        }
        if self.recv_buffer.is_some() {
            session.recv_buffer_bytes = self.recv_buffer;
        }
        if self.log_path.is_some() {
            session.log_path = self.log_path.clone();
        }
        session.stream_live_audio |= self.live;
        session.save_log |= self.save_log;

        if self.input_device.is_some() {
            config.audio.input_device = self.input_device.clone();
        }
        if self.output_device.is_some() {
            config.audio.output_device = self.output_device.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let default_filter = if opts.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (mode, session_opts) = match &opts.command {
        Command::Devices => {
            print_devices();
            return Ok(());
        }
        Command::Client(o) => (Mode::Client, o),
        Command::Server(o) => (Mode::Server, o),
        Command::Loopback(o) => (Mode::Loopback, o),
    };

    let mut config =
        AppConfig::load(opts.config.as_deref()).context("Failed to load configuration")?;
    set_mode(&mut config.session, mode);
    session_opts.apply(&mut config);
    config.session.verbose |= opts.verbose;

    let session = Session::new(config).context("Invalid session configuration")?;
    let outcome = session.run().await.context("Session failed")?;

    match outcome {
        SessionOutcome::Measured(measured) => {
            if session_opts.json {
                println!("{}", serde_json::to_string_pretty(&measured.report)?);
            } else {
                println!("\n=== Session Report ===");
                println!("{}", measured.report);
                println!(
                    "Packets sent:      {} ({} dropped on receive)",
                    measured.sender.packets_sent, measured.dropped_frames
                );
                if measured.mismatched_frames > 0 {
                    println!("Off-size frames:   {}", measured.mismatched_frames);
                }
                if measured.sender.padded_payloads > 0 {
                    println!("Silence-padded:    {}", measured.sender.padded_payloads);
                }
                if let Some(path) = &measured.log_path {
                    println!("Sample log:        {}", path.display());
                }
            }
        }
        SessionOutcome::Relayed(relayed) => {
            println!(
                "Relayed {} packets ({} bytes sent, {} frames dropped)",
                relayed.outbound.replies_sent,
                relayed.outbound.bytes_sent,
                relayed.inbound.dropped_frames
            );
        }
    }

    Ok(())
}

/// Select the role, using the role's default ports unless they were configured
fn set_mode(session: &mut SessionConfig, mode: Mode) {
    let defaults = SessionConfig::default();
    if session.local_addr == defaults.local_addr && session.peer_addr == defaults.peer_addr {
        let role = SessionConfig::for_mode(mode);
        session.local_addr = role.local_addr;
        session.peer_addr = role.peer_addr;
    }
    session.mode = mode;
}

fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    let devices = list_devices();
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in &devices {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

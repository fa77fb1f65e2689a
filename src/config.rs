//! Session and application configuration
//!
//! Configuration is resolved once at startup: a TOML file (explicit path or
//! the platform config directory) provides the base, CLI flags override it,
//! and the resulting [`SessionConfig`] is handed to the session controller.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::HEADER_SIZE;
use crate::constants::*;
use crate::error::{Error, Result};

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Role this process plays in a measurement session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Sends probes to a relay and measures the echoes
    #[default]
    Client,
    /// Echoes probes back with dwell-time compensation
    Server,
    /// Sender and receiver in one process, no relay
    Loopback,
}

/// How the sender waits between packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingPolicy {
    /// Sleep exactly one period after every send
    #[default]
    Fixed,
    /// Spread the remaining packets over the remaining time
    Adaptive,
}

/// Parameters of one measurement session
///
/// Every derived size must match across client, relay and loopback peers
/// for a session to interoperate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: Mode,
    /// Address this endpoint binds to
    pub local_addr: SocketAddr,
    /// Address probes (or echoes) are sent to
    pub peer_addr: SocketAddr,
    pub sample_rate: u32,
    /// Audio frames per packet
    pub frame_size: u32,
    /// Bits per sample
    pub bit_resolution: u16,
    pub channels: u16,
    pub running_duration_secs: f64,
    /// Explicit packet budget; the duration still bounds the run
    pub packet_count: Option<u32>,
    pub pacing: PacingPolicy,
    pub verbose: bool,
    pub stream_live_audio: bool,
    pub save_log: bool,
    /// Where the sample log is written when `save_log` is set
    pub log_path: Option<PathBuf>,
    /// SO_RCVBUF override, defaults to one ring buffer's worth of frames
    pub recv_buffer_bytes: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_CLIENT_PORT),
            peer_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_SERVER_PORT),
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            bit_resolution: DEFAULT_BIT_RESOLUTION,
            channels: DEFAULT_CHANNELS,
            running_duration_secs: DEFAULT_RUNNING_SECS,
            packet_count: None,
            pacing: PacingPolicy::Fixed,
            verbose: false,
            stream_live_audio: false,
            save_log: false,
            log_path: None,
            recv_buffer_bytes: None,
        }
    }
}

impl SessionConfig {
    /// Defaults for a role, with the ports swapped for the server side
    pub fn for_mode(mode: Mode) -> Self {
        let mut config = Self {
            mode,
            ..Self::default()
        };
        if mode == Mode::Server {
            config.local_addr.set_port(DEFAULT_SERVER_PORT);
            config.peer_addr.set_port(DEFAULT_CLIENT_PORT);
        }
        config
    }

    /// Check that the configuration describes a usable session
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".into()));
        }
        if self.frame_size == 0 {
            return Err(Error::Config("frame size must be positive".into()));
        }
        if self.channels == 0 {
            return Err(Error::Config("channel count must be positive".into()));
        }
        if self.bit_resolution == 0 || self.bit_resolution % 8 != 0 {
            return Err(Error::Config(format!(
                "bit resolution must be a positive multiple of 8, got {}",
                self.bit_resolution
            )));
        }
        if !self.running_duration_secs.is_finite()
            || self.running_duration_secs <= 0.0
            || Duration::try_from_secs_f64(self.running_duration_secs).is_err()
        {
            return Err(Error::Config(format!(
                "running duration must be a positive number of seconds, got {}",
                self.running_duration_secs
            )));
        }
        if self.packet_count == Some(0) {
            return Err(Error::Config("packet count must be positive".into()));
        }
        if self.stream_live_audio && self.bit_resolution != 16 {
            return Err(Error::Config(format!(
                "live audio streams 16-bit PCM, got {}-bit",
                self.bit_resolution
            )));
        }
        if self.frame_len() > MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "frame of {} bytes does not fit in one datagram",
                self.frame_len()
            )));
        }
        Ok(())
    }

    /// Bytes of PCM audio in one packet's worth of frames
    pub fn audio_buffer_bytes(&self) -> usize {
        (self.bit_resolution as usize / 8) * self.channels as usize * self.frame_size as usize
    }

    /// Packets per second
    pub fn packet_rate(&self) -> f64 {
        self.sample_rate as f64 / self.frame_size as f64
    }

    /// Nominal time between two packets
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.packet_rate())
    }

    /// Session duration, clamped to what [`Duration`] can hold
    pub fn running_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.running_duration_secs).unwrap_or(Duration::MAX)
    }

    /// Packet budget of a session; fractional when duration-bounded
    pub fn total_packets(&self) -> f64 {
        match self.packet_count {
            Some(count) => count as f64,
            None => self.packet_rate() * self.running_duration_secs,
        }
    }

    /// Payload length carried by every frame
    ///
    /// Filler payload keeps the whole frame at one audio buffer; live audio
    /// carries a full buffer behind the header.
    pub fn payload_len(&self) -> usize {
        if self.stream_live_audio {
            self.audio_buffer_bytes()
        } else {
            self.audio_buffer_bytes().saturating_sub(HEADER_SIZE)
        }
    }

    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Receive buffer size requested from the OS
    ///
    /// Room for [`RING_BUFFER_CAPACITY`] frames unless overridden, so a
    /// short receiver stall does not show up as packet loss. The kernel
    /// may clamp the request.
    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_bytes
            .unwrap_or_else(|| self.frame_len().saturating_mul(RING_BUFFER_CAPACITY))
    }

    /// Path of the CSV sample log
    pub fn csv_path(&self) -> PathBuf {
        self.log_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "results_{}_{}_{}.csv",
                self.sample_rate, self.frame_size, self.channels
            ))
        })
    }
}

/// Live audio device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name, default input when unset
    pub input_device: Option<String>,
    /// Playback device name, default output when unset
    pub output_device: Option<String>,
    /// Ring buffer capacity in chunks
    pub ring_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            ring_capacity: RING_BUFFER_CAPACITY,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load from an explicit file, or from the default location if present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// `<platform config dir>/lan-audio-probe/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lan-audio-probe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_values() {
        let config = SessionConfig {
            sample_rate: 48_000,
            frame_size: 256,
            bit_resolution: 16,
            channels: 2,
            running_duration_secs: 1.0,
            ..Default::default()
        };

        assert_eq!(config.audio_buffer_bytes(), 1024);
        assert!((config.packet_rate() - 187.5).abs() < 1e-9);
        assert!((config.total_packets() - 187.5).abs() < 1e-9);
        assert_eq!(config.payload_len(), 1012);
        assert_eq!(config.frame_len(), 1024);
        assert_eq!(config.period(), Duration::from_secs_f64(256.0 / 48_000.0));
    }

    #[test]
    fn test_live_audio_carries_full_buffer() {
        let config = SessionConfig {
            stream_live_audio: true,
            ..Default::default()
        };
        assert_eq!(config.payload_len(), config.audio_buffer_bytes());
        assert_eq!(config.frame_len(), config.audio_buffer_bytes() + HEADER_SIZE);
    }

    #[test]
    fn test_tiny_buffer_saturates_payload() {
        let config = SessionConfig {
            frame_size: 2,
            channels: 1,
            ..Default::default()
        };
        assert_eq!(config.audio_buffer_bytes(), 4);
        assert_eq!(config.payload_len(), 0);
        assert_eq!(config.frame_len(), HEADER_SIZE);
    }

    #[test]
    fn test_packet_count_overrides_budget() {
        let config = SessionConfig {
            packet_count: Some(50),
            ..Default::default()
        };
        assert_eq!(config.total_packets(), 50.0);
    }

    #[test]
    fn test_server_defaults_swap_ports() {
        let server = SessionConfig::for_mode(Mode::Server);
        assert_eq!(server.local_addr.port(), DEFAULT_SERVER_PORT);
        assert_eq!(server.peer_addr.port(), DEFAULT_CLIENT_PORT);

        let client = SessionConfig::for_mode(Mode::Client);
        assert_eq!(client.local_addr.port(), DEFAULT_CLIENT_PORT);
        assert_eq!(client.peer_addr.port(), DEFAULT_SERVER_PORT);
    }

    #[test]
    fn test_validation() {
        assert!(SessionConfig::default().validate().is_ok());

        let bad_bits = SessionConfig {
            bit_resolution: 12,
            ..Default::default()
        };
        assert!(matches!(bad_bits.validate(), Err(Error::Config(_))));

        let live_24 = SessionConfig {
            bit_resolution: 24,
            stream_live_audio: true,
            ..Default::default()
        };
        assert!(live_24.validate().is_err());

        let no_time = SessionConfig {
            running_duration_secs: 0.0,
            ..Default::default()
        };
        assert!(no_time.validate().is_err());

        // Finite, but past what a Duration can hold
        let forever = SessionConfig {
            running_duration_secs: 1e20,
            ..Default::default()
        };
        assert!(matches!(forever.validate(), Err(Error::Config(_))));
        assert_eq!(forever.running_duration(), Duration::MAX);

        let nan = SessionConfig {
            running_duration_secs: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let jumbo = SessionConfig {
            frame_size: 65_536,
            ..Default::default()
        };
        assert!(jumbo.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [session]
            mode = "server"
            frame_size = 128
            pacing = "adaptive"

            [audio]
            input_device = "USB Audio"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.mode, Mode::Server);
        assert_eq!(config.session.frame_size, 128);
        assert_eq!(config.session.pacing, PacingPolicy::Adaptive);
        assert_eq!(config.session.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.audio.input_device.as_deref(), Some("USB Audio"));
        assert_eq!(config.audio.ring_capacity, RING_BUFFER_CAPACITY);
    }

    #[test]
    fn test_recv_buffer_sizing() {
        let config = SessionConfig::default();
        assert_eq!(config.recv_buffer_size(), 1024 * RING_BUFFER_CAPACITY);

        let overridden = SessionConfig {
            recv_buffer_bytes: Some(4096),
            ..Default::default()
        };
        assert_eq!(overridden.recv_buffer_size(), 4096);
    }

    #[test]
    fn test_csv_path_naming() {
        let config = SessionConfig::default();
        assert_eq!(config.csv_path(), PathBuf::from("results_48000_256_2.csv"));
    }
}

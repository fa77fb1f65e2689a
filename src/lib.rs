//! # LAN Audio Probe
//!
//! One-way latency, jitter, bandwidth and packet-loss measurement for
//! low-latency audio links over UDP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────── CLIENT ────────────────────────┐
//! │                                                        │
//! │  PayloadSource ──► Sender loop ──┐   ┌──► Receiver loop ──► Aggregator
//! │  (zeros / mic)     (Pacer)       │   │    (SampleLog)        │
//! │                                  │   │                       ▼
//! └──────────────────────────────────┼───┼────────────── SessionReport / CSV
//!                                    │   │
//!            [idx|ts|payload] UDP    │   │  [idx|ts+dwell|payload] UDP
//!                                    ▼   │
//! ┌──────────────────────── SERVER ──────┼─────────────────┐
//! │                                      │                 │
//! │  Relay inbound ──► (idx, dwell) FIFO ──► Relay outbound│
//! │  (optional speaker sink)             (optional mic)    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! In loopback mode the sender and receiver run in one process and the
//! relay is skipped. A packet with sequence index 0 terminates every loop.

pub mod audio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod pacing;
pub mod record;
pub mod session;
pub mod stats;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default audio frames per packet
    pub const DEFAULT_FRAME_SIZE: u32 = 256;

    /// Default bits per sample
    pub const DEFAULT_BIT_RESOLUTION: u16 = 16;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default UDP port of the relay (server role)
    pub const DEFAULT_SERVER_PORT: u16 = 30001;

    /// Default UDP port of the client
    pub const DEFAULT_CLIENT_PORT: u16 = 30002;

    /// Default measurement duration in seconds
    pub const DEFAULT_RUNNING_SECS: f64 = 10.0;

    /// Lock-free ring buffer capacity (in chunks)
    pub const RING_BUFFER_CAPACITY: usize = 256;
}

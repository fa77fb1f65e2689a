//! Send cadence
//!
//! The sender emits one packet per audio buffer period. [`Pacer`] decides how
//! long to wait after each send, either a fixed period or an adaptive delay
//! that lets a late sender catch up instead of drifting for the rest of the
//! session.

use std::time::{Duration, Instant};

use crate::config::{PacingPolicy, SessionConfig};

/// Computes the wait before the next send
#[derive(Debug, Clone)]
pub struct Pacer {
    policy: PacingPolicy,
    /// Nominal time between two packets
    period: Duration,
    /// Session duration the packet budget is spread over
    total_duration: Duration,
    /// Packet budget, fractional when derived from a duration
    total_packets: f64,
    started: Instant,
}

impl Pacer {
    pub fn new(
        policy: PacingPolicy,
        period: Duration,
        total_duration: Duration,
        total_packets: f64,
    ) -> Self {
        Self {
            policy,
            period,
            total_duration,
            total_packets,
            started: Instant::now(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.pacing,
            config.period(),
            config.running_duration(),
            config.total_packets(),
        )
    }

    /// Reset the session start to now
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Delay before the next send, given how many packets went out so far
    pub fn next_delay(&self, sent: u64) -> Duration {
        self.delay_at(self.started.elapsed(), sent)
    }

    /// Delay for an explicit elapsed time
    pub fn delay_at(&self, elapsed: Duration, sent: u64) -> Duration {
        match self.policy {
            PacingPolicy::Fixed => self.period,
            PacingPolicy::Adaptive => self.adaptive_delay(elapsed, sent),
        }
    }

    fn adaptive_delay(&self, elapsed: Duration, sent: u64) -> Duration {
        if sent == 0 || elapsed >= self.total_duration {
            return Duration::ZERO;
        }

        let remaining_packets = self.total_packets - sent as f64;
        if remaining_packets <= 0.0 {
            return Duration::ZERO;
        }

        let remaining_time = (self.total_duration - elapsed).as_secs_f64();
        Duration::try_from_secs_f64(remaining_time / remaining_packets)
            .map_or(self.period, |delay| delay.min(self.period))
    }
}

//! Session statistics
//!
//! The receiver produces one [`SampleRecord`] per echoed packet; at the end of
//! a session the log is folded into a [`SessionReport`].

use serde::Serialize;
use std::fmt;

use crate::error::StatsError;

/// Per-packet measurement taken by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleRecord {
    pub sequence_index: u32,
    /// Half of the measured round trip, in seconds
    pub latency_secs: f64,
    /// Absolute change of latency against the previous packet
    pub jitter_secs: f64,
    /// Local wall-clock receive time
    pub received_at_nanos: i64,
    pub packet_size_bytes: usize,
}

/// Session-level summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub sample_count: usize,
    /// Time between the first and the last received packet
    pub wall_span_secs: f64,
    pub latency_avg: f64,
    pub latency_max: f64,
    pub latency_min: f64,
    /// Population standard deviation of latency
    pub latency_std: f64,
    /// Spread of latency over the session (max - min)
    pub jitter_range: f64,
    /// Mean of the per-packet jitter values
    pub packet_jitter_avg: f64,
    pub bandwidth_bytes_per_sec: f64,
    /// Highest index seen minus packets received. Duplicates push it down,
    /// possibly below zero.
    pub packet_loss: i64,
}

impl SessionReport {
    pub fn bandwidth_mbps(&self) -> f64 {
        self.bandwidth_bytes_per_sec * 8.0 / 1024.0 / 1024.0
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples received:  {}", self.sample_count)?;
        writeln!(f, "Wall-clock span:   {:.3} s", self.wall_span_secs)?;
        writeln!(
            f,
            "Latency avg/min/max: {:.3} / {:.3} / {:.3} ms",
            self.latency_avg * 1e3,
            self.latency_min * 1e3,
            self.latency_max * 1e3
        )?;
        writeln!(f, "Latency std dev:   {:.3} ms", self.latency_std * 1e3)?;
        writeln!(f, "Jitter (range):    {:.3} ms", self.jitter_range * 1e3)?;
        writeln!(f, "Jitter (per-packet avg): {:.3} ms", self.packet_jitter_avg * 1e3)?;
        writeln!(
            f,
            "Bandwidth:         {:.0} B/s ({:.3} Mbit/s)",
            self.bandwidth_bytes_per_sec,
            self.bandwidth_mbps()
        )?;
        write!(f, "Packet loss:       {}", self.packet_loss)
    }
}

/// Fold a sample log into a session report
pub fn aggregate(samples: &[SampleRecord]) -> Result<SessionReport, StatsError> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(StatsError::InsufficientData),
    };

    let count = samples.len() as f64;

    let mut latency_sum = 0.0;
    let mut latency_max = f64::NEG_INFINITY;
    let mut latency_min = f64::INFINITY;
    let mut jitter_sum = 0.0;
    let mut total_bytes = 0usize;
    let mut max_index = 0u32;

    for sample in samples {
        latency_sum += sample.latency_secs;
        latency_max = latency_max.max(sample.latency_secs);
        latency_min = latency_min.min(sample.latency_secs);
        jitter_sum += sample.jitter_secs;
        total_bytes += sample.packet_size_bytes;
        max_index = max_index.max(sample.sequence_index);
    }

    let latency_avg = latency_sum / count;
    let variance = samples
        .iter()
        .map(|s| (s.latency_secs - latency_avg).powi(2))
        .sum::<f64>()
        / count;

    let wall_span_secs = (last.received_at_nanos - first.received_at_nanos) as f64 * 1e-9;
    let bandwidth_bytes_per_sec = if wall_span_secs > 0.0 {
        total_bytes as f64 / wall_span_secs
    } else {
        0.0
    };

    Ok(SessionReport {
        sample_count: samples.len(),
        wall_span_secs,
        latency_avg,
        latency_max,
        latency_min,
        latency_std: variance.sqrt(),
        jitter_range: latency_max - latency_min,
        packet_jitter_avg: jitter_sum / count,
        bandwidth_bytes_per_sec,
        packet_loss: max_index as i64 - samples.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, latency: f64, received_at_nanos: i64) -> SampleRecord {
        SampleRecord {
            sequence_index: index,
            latency_secs: latency,
            jitter_secs: 0.0,
            received_at_nanos,
            packet_size_bytes: 1024,
        }
    }

    #[test]
    fn test_latency_summary() {
        let samples = [
            record(1, 0.010, 0),
            record(2, 0.012, 5_000_000),
            record(3, 0.011, 10_000_000),
        ];
        let report = aggregate(&samples).unwrap();

        assert_eq!(report.sample_count, 3);
        assert!((report.latency_avg - 0.011).abs() < 1e-12);
        assert_eq!(report.latency_max, 0.012);
        assert_eq!(report.latency_min, 0.010);
        assert!((report.jitter_range - 0.002).abs() < 1e-12);
        // sqrt(((-0.001)^2 + 0.001^2 + 0) / 3)
        assert!((report.latency_std - (2.0e-6f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(report.packet_loss, 0);
    }

    #[test]
    fn test_packet_loss_from_gaps() {
        let samples = [record(1, 0.0, 0), record(3, 0.0, 1), record(4, 0.0, 2)];
        assert_eq!(aggregate(&samples).unwrap().packet_loss, 1);
    }

    #[test]
    fn test_duplicates_drive_loss_negative() {
        let samples = [record(1, 0.0, 0), record(1, 0.0, 1), record(2, 0.0, 2)];
        assert_eq!(aggregate(&samples).unwrap().packet_loss, -1);
    }

    #[test]
    fn test_bandwidth_over_wall_span() {
        let samples = [record(1, 0.0, 0), record(2, 0.0, 500_000_000)];
        let report = aggregate(&samples).unwrap();
        assert!((report.wall_span_secs - 0.5).abs() < 1e-12);
        assert!((report.bandwidth_bytes_per_sec - 4096.0).abs() < 1e-6);
        assert!((report.bandwidth_mbps() - 4096.0 * 8.0 / 1_048_576.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_has_zero_bandwidth() {
        let report = aggregate(&[record(1, 0.004, 42)]).unwrap();
        assert_eq!(report.wall_span_secs, 0.0);
        assert_eq!(report.bandwidth_bytes_per_sec, 0.0);
        assert_eq!(report.latency_std, 0.0);
    }

    #[test]
    fn test_packet_jitter_kept_separate() {
        let mut samples = [record(1, 0.010, 0), record(2, 0.014, 1)];
        samples[0].jitter_secs = 0.010;
        samples[1].jitter_secs = 0.004;
        let report = aggregate(&samples).unwrap();
        assert!((report.packet_jitter_avg - 0.007).abs() < 1e-12);
        assert!((report.jitter_range - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_empty_log_is_rejected() {
        assert_eq!(aggregate(&[]), Err(StatsError::InsufficientData));
    }
}

//! Wall-clock timestamps carried on the wire

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the UNIX epoch
///
/// Latency is derived by subtracting timestamps taken on different hosts,
/// so this is wall-clock time rather than a monotonic instant. Clocks
/// before the epoch read as 0.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let a = now_nanos();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_nanos();
        assert!(a > 0);
        assert!(b > a);
    }
}

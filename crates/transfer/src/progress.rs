use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Byte count and wall time of one finished transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Throughput {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Returns the rate in MB/s.
    ///
    /// Returns `None` when no bytes moved or the elapsed time rounds to
    /// zero, so callers can leave the rate unreported.
    pub fn mb_per_sec(&self) -> Option<f64> {
        if self.bytes == 0 || self.elapsed.is_zero() {
            return None;
        }
        Some(self.bytes as f64 / BYTES_PER_MB / self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_in_megabytes() {
        let t = Throughput::new(4 * 1024 * 1024, Duration::from_secs(2));
        assert_eq!(t.mb_per_sec(), Some(2.0));
    }

    #[test]
    fn zero_duration_is_unreported() {
        let t = Throughput::new(1024, Duration::ZERO);
        assert!(t.mb_per_sec().is_none());
    }

    #[test]
    fn zero_bytes_is_unreported() {
        let t = Throughput::new(0, Duration::from_secs(1));
        assert!(t.mb_per_sec().is_none());
    }
}

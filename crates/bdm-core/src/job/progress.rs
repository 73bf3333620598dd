//! Progress arithmetic for a running download (percent, rate, ETA).
//!
//! Consumers compute rate = bytes_done / elapsed_secs and
//! ETA = (total_bytes - bytes_done) / rate.

/// Point-in-time progress of one job.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStats {
    pub bytes_done: u64,
    /// 0 when the backend has not reported a size yet.
    pub total_bytes: u64,
    /// Seconds since the job started downloading.
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the size or rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Percentage complete in [0, 100], or None while the size is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.bytes_done as f64 / self.total_bytes as f64 * 100.0).min(100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_eta() {
        let s = ProgressStats {
            bytes_done: 500,
            total_bytes: 1500,
            elapsed_secs: 5.0,
        };
        assert!((s.bytes_per_sec() - 100.0).abs() < 1e-9);
        assert!((s.eta_secs().unwrap() - 10.0).abs() < 1e-9);
        assert!((s.percent().unwrap() - 33.333).abs() < 0.01);
    }

    #[test]
    fn unknown_size_has_no_percent_or_eta() {
        let s = ProgressStats {
            bytes_done: 500,
            total_bytes: 0,
            elapsed_secs: 1.0,
        };
        assert!(s.percent().is_none());
        assert!(s.eta_secs().is_none());
    }

    #[test]
    fn overshoot_is_clamped() {
        let s = ProgressStats {
            bytes_done: 120,
            total_bytes: 100,
            elapsed_secs: 0.0,
        };
        assert_eq!(s.percent(), Some(100.0));
        assert_eq!(s.eta_secs(), Some(0.0));
        assert_eq!(s.bytes_per_sec(), 0.0);
    }
}

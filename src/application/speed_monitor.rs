use std::collections::VecDeque;
use std::time::Duration;

pub const SPEED_CHECK_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSample {
    pub timestamp_ms: u64,
    pub bytes: u64,
}

/// Raised when a full window averaged less than the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowSpeed {
    pub window_speed_kbps: f64,
    pub threshold_kbps: f64,
}

/// Sliding-window throughput check for unauthenticated transfers.
///
/// Only the most recent full window decides; a slow start that later
/// recovers is never flagged once it slides out of the window.
#[derive(Debug)]
pub struct SpeedMonitor {
    window_ms: u64,
    threshold_kbps: f64,
    samples: VecDeque<SpeedSample>,
}

impl SpeedMonitor {
    pub fn new(threshold_kbps: f64) -> Self {
        Self {
            window_ms: SPEED_CHECK_WINDOW.as_millis() as u64,
            threshold_kbps,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample (cumulative byte count at `timestamp_ms`) and evaluate
    /// the window.
    pub fn record(&mut self, timestamp_ms: u64, bytes: u64) -> Option<LowSpeed> {
        self.samples.push_back(SpeedSample {
            timestamp_ms,
            bytes,
        });

        // Keep the newest sample at or before the cutoff as the window anchor,
        // so the window spans at least `window_ms` once that much time passed.
        let cutoff = timestamp_ms.saturating_sub(self.window_ms);
        while self.samples.len() >= 2 && self.samples[1].timestamp_ms <= cutoff {
            self.samples.pop_front();
        }

        let (oldest, newest) = (self.samples.front()?, self.samples.back()?);
        if self.samples.len() < 2 {
            return None;
        }

        let elapsed_ms = newest.timestamp_ms.saturating_sub(oldest.timestamp_ms);
        if elapsed_ms < self.window_ms {
            return None;
        }

        let window_speed_kbps = speed_kbps(newest.bytes.saturating_sub(oldest.bytes), elapsed_ms);
        if window_speed_kbps < self.threshold_kbps {
            Some(LowSpeed {
                window_speed_kbps,
                threshold_kbps: self.threshold_kbps,
            })
        } else {
            None
        }
    }
}

/// KB/s for `bytes` over `elapsed_ms`; zero when no time has elapsed.
pub fn speed_kbps(bytes: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    (bytes as f64 / 1024.0) / (elapsed_ms as f64 / 1000.0)
}

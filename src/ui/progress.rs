use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::time::Instant;

pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Single overwritten status line: `[pixeldrain] 45.3% of 12.00MB at 1.52 MB/s`
pub struct ProgressLine {
    bar: ProgressBar,
    last_update: Option<Instant>,
}

impl ProgressLine {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("[pixeldrain] {msg}") {
            bar.set_style(style);
        }

        Self {
            bar,
            last_update: None,
        }
    }

    /// Redraw unless the previous redraw was less than 200ms ago.
    /// Returns whether the line was redrawn.
    pub fn update(&mut self, downloaded: u64, total: Option<u64>, speed_kbps: f64, now: Instant) -> bool {
        if let Some(last) = self.last_update {
            if now.duration_since(last) < PROGRESS_UPDATE_INTERVAL {
                return false;
            }
        }

        self.bar.set_message(format_status(downloaded, total, speed_kbps));
        self.last_update = Some(now);
        true
    }

    /// Final draw at stream end; leaves the line in place.
    pub fn finish(&self, downloaded: u64, total: Option<u64>, speed_kbps: f64) {
        self.bar
            .finish_with_message(format_status(downloaded, total, speed_kbps));
    }

    /// Stop drawing without a final update (aborted stream).
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

pub fn format_speed(speed_kbps: f64) -> String {
    if speed_kbps >= 1024.0 {
        format!("{:.2} MB/s", speed_kbps / 1024.0)
    } else {
        format!("{:.1} KB/s", speed_kbps)
    }
}

pub fn format_status(downloaded: u64, total: Option<u64>, speed_kbps: f64) -> String {
    const MB: f64 = 1024.0 * 1024.0;

    match total.filter(|t| *t > 0) {
        Some(total) => format!(
            "{:.1}% of {:.2}MB at {}",
            downloaded as f64 / total as f64 * 100.0,
            total as f64 / MB,
            format_speed(speed_kbps)
        ),
        None => format!(
            "{:.2}MB at {}",
            downloaded as f64 / MB,
            format_speed(speed_kbps)
        ),
    }
}

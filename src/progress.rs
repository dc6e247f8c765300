//! Progress bars and tail-friendly progress lines.
//!
//! In log-only mode bars are hidden and `log` prints periodic lines to
//! stderr instead, so redirected runs stay readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Progress {
    log_only: bool,
}

impl Progress {
    pub fn new(log_only: bool) -> Self {
        Self { log_only }
    }

    pub fn is_log_only(&self) -> bool {
        self.log_only
    }

    pub fn bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if self.log_only {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        } else if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(msg.to_string());
        pb
    }

    pub fn spinner(&self, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if self.log_only {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Log-only mode: print every `interval` items and at the end.
    pub fn log(&self, phase: &str, current: u64, total: u64, interval: u64) {
        if let Some(line) = self.log_line(phase, current, total, interval) {
            eprintln!("{}", line);
        }
    }

    fn log_line(&self, phase: &str, current: u64, total: u64, interval: u64) -> Option<String> {
        if !self.log_only || total == 0 {
            return None;
        }
        if current == total || (interval > 0 && current % interval == 0) {
            let pct = 100.0 * current as f64 / total as f64;
            Some(format!("[{}] {}/{} ({:.1}%)", phase, current, total, pct))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_log_line_intervals() {
        let progress = Progress::new(true);
        assert_eq!(progress.log_line("WRITE", 3, 10, 5), None);
        assert_eq!(progress.log_line("WRITE", 5, 10, 5).as_deref(), Some("[WRITE] 5/10 (50.0%)"));
        assert_eq!(
            progress.log_line("WRITE", 10, 10, 7).as_deref(),
            Some("[WRITE] 10/10 (100.0%)")
        );
        assert_eq!(progress.log_line("WRITE", 0, 0, 5), None);
    }

    #[test]
    fn test_interactive_mode_is_silent() {
        let progress = Progress::new(false);
        assert_eq!(progress.log_line("WRITE", 10, 10, 1), None);
        assert!(progress.bar(10, "x").length() == Some(10));
    }
}

//! Batch Progress Reporting
//!
//! Long migration and cleanup runs log their progress with an ETA, throttled
//! so the log stays readable: percent complete is computed on every processed
//! item, but a line is only emitted when the percentage crosses a reporting
//! threshold, and only once the estimated remaining time exceeds one minute.
//! The threshold adapts to the estimate - the longer the job has left, the
//! finer the granularity - so lines arrive at a roughly constant rate.

use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);
const TWENTY_MINUTES: Duration = Duration::from_secs(20 * 60);
const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

/// Throttled progress tracker for one batch run.
#[derive(Debug)]
pub struct BatchProgress {
    process_name: String,
    total: usize,
    done: usize,
    started: Instant,
    last_reported_percent: Option<u32>,
}

impl BatchProgress {
    pub fn new(process_name: impl Into<String>, total: usize) -> Self {
        Self {
            process_name: process_name.into(),
            total,
            done: 0,
            started: Instant::now(),
            last_reported_percent: None,
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Record one processed item, logging a progress line if a reporting
    /// threshold was crossed.
    pub fn item_processed(&mut self) {
        self.done += 1;
        let elapsed = self.started.elapsed();
        if let Some(update) = progress_update(
            self.done,
            self.total,
            elapsed,
            self.last_reported_percent,
        ) {
            self.last_reported_percent = Some(update.percent);
            tracing::info!(
                "{}: {}% complete ({}/{}), estimated remaining {}",
                self.process_name,
                update.percent,
                self.done,
                self.total,
                format_duration(update.estimated_remaining),
            );
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A progress line that should be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u32,
    pub estimated_remaining: Duration,
}

/// Decide whether a progress line is due.
///
/// Pure so the throttling rules are testable without a clock.
pub fn progress_update(
    done: usize,
    total: usize,
    elapsed: Duration,
    last_reported_percent: Option<u32>,
) -> Option<ProgressUpdate> {
    if total == 0 || done == 0 {
        return None;
    }
    let percent = ((done * 100) / total) as u32;
    if percent == 0 || Some(percent) == last_reported_percent {
        return None;
    }

    let estimated_remaining = estimate_remaining(elapsed, percent);
    let interval = reporting_interval(estimated_remaining)?;
    if percent % interval != 0 {
        return None;
    }
    if let Some(last) = last_reported_percent {
        if percent <= last {
            return None;
        }
    }
    Some(ProgressUpdate {
        percent,
        estimated_remaining,
    })
}

/// Remaining time extrapolated from elapsed time and percent complete.
fn estimate_remaining(elapsed: Duration, percent: u32) -> Duration {
    debug_assert!(percent > 0);
    elapsed.mul_f64((100 - percent) as f64 / percent as f64)
}

/// Percent granularity for the given remaining-time estimate; `None` means
/// stay quiet.
fn reporting_interval(remaining: Duration) -> Option<u32> {
    if remaining < MINUTE {
        None
    } else if remaining >= ONE_HOUR {
        Some(1)
    } else if remaining >= TWENTY_MINUTES {
        Some(2)
    } else if remaining >= TEN_MINUTES {
        Some(5)
    } else {
        Some(10)
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

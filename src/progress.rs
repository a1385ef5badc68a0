//! Round-level observation hooks. The pagination loop reports through
//! [`ExecutionObserver`] and never prints on its own.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::EngineConfig;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundProgress {
    pub round: usize,
    /// Root records received this round.
    pub batch_count: usize,
    /// Root records received so far.
    pub retrieved: u64,
    pub estimated_total: Option<u64>,
    pub round_elapsed: Duration,
    pub total_elapsed: Duration,
}

pub trait ExecutionObserver {
    fn on_round_complete(&mut self, _progress: &RoundProgress) {}

    /// Called once per execution, the first time the batch cap shrinks.
    fn on_batch_reduced(&mut self, _new_limit: u64) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressReport {
    pub retrieved: u64,
    pub estimated_total: Option<u64>,
    /// Smoothed records per second.
    pub rate: f64,
    pub remaining: Option<Duration>,
}

/// Default observer: smoothed rate estimate, reports only for long-running plans.
#[derive(Clone, Debug)]
pub struct LoggingObserver {
    threshold: Duration,
    cadence: u64,
    smoothing: f64,
    rate: Option<f64>,
    reporting: bool,
    last_reported: u64,
}

impl LoggingObserver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.progress_threshold(),
            cadence: config.progress_cadence.max(1),
            smoothing: config.progress_smoothing,
            rate: None,
            reporting: false,
            last_reported: 0,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting
    }

    /// Updates the rate estimate and decides whether this round deserves a report.
    pub fn observe(&mut self, progress: &RoundProgress) -> Option<ProgressReport> {
        let seconds = progress.round_elapsed.as_secs_f64();
        if seconds > 0.0 {
            let batch_rate = progress.batch_count as f64 / seconds;
            self.rate = Some(match self.rate {
                Some(previous) => self.smoothing * batch_rate + (1.0 - self.smoothing) * previous,
                None => batch_rate,
            });
        }
        let rate = self.rate.unwrap_or(0.0);
        let remaining = match progress.estimated_total {
            Some(total) if rate > 0.0 => Some(Duration::from_secs_f64(
                total.saturating_sub(progress.retrieved) as f64 / rate,
            )),
            _ => None,
        };
        let projected = progress.total_elapsed + remaining.unwrap_or_default();

        let due = if self.reporting {
            progress.retrieved.saturating_sub(self.last_reported) >= self.cadence
        } else {
            projected > self.threshold
        };
        if !due {
            return None;
        }
        self.reporting = true;
        self.last_reported = progress.retrieved;
        Some(ProgressReport {
            retrieved: progress.retrieved,
            estimated_total: progress.estimated_total,
            rate,
            remaining,
        })
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ExecutionObserver for LoggingObserver {
    fn on_round_complete(&mut self, progress: &RoundProgress) {
        if let Some(report) = self.observe(progress) {
            match (report.estimated_total, report.remaining) {
                (Some(total), Some(remaining)) => info!(
                    retrieved = report.retrieved,
                    total,
                    rate = %format!("{:.1}", report.rate),
                    remaining_secs = remaining.as_secs(),
                    "query progress"
                ),
                _ => info!(retrieved = report.retrieved, "query progress"),
            }
        }
    }

    fn on_batch_reduced(&mut self, new_limit: u64) {
        warn!(new_limit, "query payload too large, reducing batch size and retrying");
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use fanout_core::{JobError, JobErrorKind};
use serde::Serialize;

/// Counters describing one scheduler's batch so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Jobs whose `start` succeeded.
    pub jobs_started: u64,
    /// Jobs yielded to the caller (including failed ones).
    pub jobs_finished: u64,
    /// Yielded jobs that carried an error-log entry.
    pub jobs_failed: u64,
    /// Jobs whose `start` failed.
    pub start_failures: u64,
    /// Jobs that hit their wall-clock limit.
    pub timeouts: u64,
    /// Heartbeats emitted because nothing finished within the poll interval.
    pub heartbeats: u64,
    /// Highest number of jobs running at the same time.
    pub peak_running: usize,
    /// Mean time from admission to being yielded.
    pub avg_job_duration: Duration,
    /// Wall-clock time of the most recent yield.
    pub last_finished_at: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    pub(crate) fn record_started(&mut self, running_now: usize) {
        self.jobs_started += 1;
        self.peak_running = self.peak_running.max(running_now);
    }

    pub(crate) fn record_start_failure(&mut self) {
        self.start_failures += 1;
    }

    pub(crate) fn record_heartbeat(&mut self) {
        self.heartbeats += 1;
    }

    /// Record a job handed back to the caller.
    pub(crate) fn record_finished(&mut self, duration: Duration, error: Option<&JobError>) {
        self.jobs_finished += 1;
        self.last_finished_at = Some(Utc::now());
        if let Some(err) = error {
            self.jobs_failed += 1;
            if err.kind() == JobErrorKind::TimedOut {
                self.timeouts += 1;
            }
        }

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.jobs_finished;
        self.avg_job_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_job_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    /// Jobs yielded without an error-log entry.
    pub fn jobs_succeeded(&self) -> u64 {
        self.jobs_finished - self.jobs_failed
    }
}

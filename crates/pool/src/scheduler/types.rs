use std::time::Duration;

use fanout_core::JobKey;

/// Sleep between scans that found nothing finished.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1);

/// One step of iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The job under this key finished and is now done.
    Finished(JobKey),
    /// Nothing finished within the poll interval. No key is consumed.
    Idle,
}

impl Progress {
    /// The finished key, or `None` for a heartbeat.
    pub fn key(&self) -> Option<&JobKey> {
        match self {
            Progress::Finished(key) => Some(key),
            Progress::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Progress::Idle)
    }
}

/// Where a scheduler is in its one-shot iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// Nothing has been started yet.
    NotStarted,
    /// Jobs are being admitted and yielded.
    Yielding,
    /// Every job has been yielded. Permanent until [`reset`](crate::Scheduler::reset).
    Exhausted,
}

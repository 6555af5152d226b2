use std::time::Instant;

use fanout_core::JobError;
use tracing::{debug, warn};

use crate::runnable::Runnable;

use super::Scheduler;

impl<R: Runnable> Scheduler<R> {
    /// Free slots under the current limit.
    pub(crate) fn capacity(&self) -> usize {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.running.len()),
            None => usize::MAX,
        }
    }

    /// Start waiting jobs from the front of the queue while slots are free.
    ///
    /// A job whose `start` fails is recorded and queued for yielding without
    /// taking a slot, so admission carries on with the next one.
    pub(crate) fn admit(&mut self) {
        while self.capacity() > 0 {
            let Some(position) = self.waiting.pop_front() else {
                break;
            };
            self.admitted_at[position] = Some(Instant::now());
            let Some((key, job)) = self.jobs.get_index_mut(position) else {
                continue;
            };

            match job.start() {
                Ok(()) => {
                    self.running.push(position);
                    self.metrics.record_started(self.running.len());
                    debug!(
                        key = %key,
                        job = %job.label(),
                        running = self.running.len(),
                        "job started"
                    );
                }
                Err(e) => {
                    warn!(key = %key, job = %job.label(), error = %e, "job failed to start");
                    self.errors
                        .insert(position, JobError::StartFailure(e.to_string()));
                    self.start_failed.push_back(position);
                    self.metrics.record_start_failure();
                }
            }
        }
    }
}

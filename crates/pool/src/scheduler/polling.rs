use std::iter::FusedIterator;
use std::thread;
use std::time::{Duration, Instant};

use fanout_core::{JobError, JobKey};
use tracing::{debug, info, warn};

use crate::runnable::{RunStatus, Runnable};
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::types::{IterationState, Progress};

use super::Scheduler;

impl<R: Runnable> Scheduler<R> {
    /// Snapshot every job that has not been started into the waiting queue
    /// and admit as many as fit.
    ///
    /// Jobs that already ran stay done: runnables are one-shot. Called
    /// implicitly by the first [`advance`](Self::advance); call it again after
    /// exhaustion to pick up jobs inserted since.
    pub fn reset(&mut self) {
        self.waiting = self
            .admitted_at
            .iter()
            .enumerate()
            .filter(|(_, admitted)| admitted.is_none())
            .map(|(position, _)| position)
            .collect();
        self.current = None;
        self.state = IterationState::Yielding;
        debug!(waiting = self.waiting.len(), running = self.running.len(), "iteration reset");
        self.admit();
    }

    /// Produce the next finished job, a heartbeat, or `None` once exhausted.
    ///
    /// Blocks until some job finishes, or until the poll interval elapses when
    /// one is configured.
    pub fn advance(&mut self) -> Option<Progress> {
        match self.state {
            IterationState::Exhausted => return None,
            IterationState::NotStarted => self.reset(),
            IterationState::Yielding => self.current = None,
        }

        let progress = self.poll();
        if progress.is_none() {
            self.state = IterationState::Exhausted;
            info!(
                finished = self.metrics.jobs_finished,
                failed = self.metrics.jobs_failed,
                "all jobs finished"
            );
        }
        progress
    }

    /// Drive iteration to exhaustion, waiting on each yielded job before
    /// asking for the next one.
    pub fn run_to_completion(&mut self) -> SchedulerMetrics {
        while let Some(progress) = self.advance() {
            if let Progress::Finished(key) = progress {
                if let Some(job) = self.jobs.get_mut(&key) {
                    job.wait();
                }
            }
        }
        self.metrics.clone()
    }

    fn poll(&mut self) -> Option<Progress> {
        let began = Instant::now();
        loop {
            if let Some(position) = self.start_failed.pop_front() {
                return Some(self.finish(position, None));
            }
            if self.running.is_empty() {
                if self.waiting.is_empty() {
                    return None;
                }
                self.admit();
                continue;
            }

            if let Some((slot, error)) = self.scan() {
                let position = self.running.remove(slot);
                return Some(self.finish(position, error));
            }

            if let Some(interval) = self.poll_interval {
                if began.elapsed() >= interval {
                    self.metrics.record_heartbeat();
                    debug!(running = self.running.len(), "no job finished within poll interval");
                    return Some(Progress::Idle);
                }
            }
            thread::sleep(self.backoff);
        }
    }

    /// One pass over the running jobs in admission order.
    ///
    /// Stops at the first job that is no longer running and returns its slot,
    /// with the failure it ended in, if any.
    fn scan(&mut self) -> Option<(usize, Option<JobError>)> {
        for (slot, &position) in self.running.iter().enumerate() {
            let Some(job) = self.jobs.get_index_mut(position).map(|(_, job)| job) else {
                continue;
            };
            let error = match job.poll_status() {
                RunStatus::Running => continue,
                RunStatus::Terminated { code } if self.require_success && code != Some(0) => {
                    Some(JobError::AbnormalExit { code })
                }
                RunStatus::Terminated { .. } => None,
                RunStatus::TimedOut(after) => Some(JobError::TimedOut(after)),
                RunStatus::StatusCheckFailed(cause) => Some(JobError::StatusCheckFailed(cause)),
            };
            return Some((slot, error));
        }
        None
    }

    /// Move a job to done, record its failure (if any) and hand back its key.
    fn finish(&mut self, position: usize, error: Option<JobError>) -> Progress {
        if let Some(err) = error {
            self.errors.insert(position, err);
        }
        self.done.push(position);
        self.current = Some(position);

        let duration = self.admitted_at[position]
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        let error = self.errors.get(&position);
        self.metrics.record_finished(duration, error);

        let key: JobKey = self
            .jobs
            .get_index(position)
            .map(|(key, _)| key.clone())
            .unwrap_or(JobKey::Index(position));
        match error {
            Some(err) => warn!(key = %key, error = %err, ?duration, "job failed"),
            None => info!(key = %key, ?duration, "job finished"),
        }

        self.admit();
        Progress::Finished(key)
    }
}

impl<R: Runnable> Iterator for Scheduler<R> {
    type Item = Progress;

    fn next(&mut self) -> Option<Progress> {
        self.advance()
    }
}

impl<R: Runnable> FusedIterator for Scheduler<R> {}

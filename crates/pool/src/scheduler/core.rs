use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use fanout_core::{JobError, JobKey, PoolConfig, SchedulerError};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::runnable::Runnable;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::types::IterationState;

/// Bounded-concurrency scheduler that yields jobs in completion order.
///
/// Jobs live in a single arena in insertion order. The waiting, running and
/// done partitions hold arena positions only, so a job is never copied
/// between them.
pub struct Scheduler<R> {
    /// Every job ever inserted, in insertion order.
    pub(super) jobs: IndexMap<JobKey, R>,
    /// Admission time per arena position; `None` until started.
    pub(super) admitted_at: Vec<Option<Instant>>,
    /// Not yet started, in insertion order.
    pub(super) waiting: VecDeque<usize>,
    /// Started and not yet yielded, in admission order.
    pub(super) running: Vec<usize>,
    /// Failed to start; yielded before the next scan without holding a slot.
    pub(super) start_failed: VecDeque<usize>,
    /// Yielded to the caller.
    pub(super) done: Vec<usize>,
    /// Most recent failure per arena position.
    pub(super) errors: BTreeMap<usize, JobError>,
    pub(super) limit: Option<usize>,
    pub(super) poll_interval: Option<Duration>,
    pub(super) backoff: Duration,
    pub(super) require_success: bool,
    /// Next auto-assigned index.
    pub(super) next_index: usize,
    pub(super) state: IterationState,
    /// Arena position of the most recently yielded job.
    pub(super) current: Option<usize>,
    pub(super) metrics: SchedulerMetrics,
}

impl<R: Runnable> Scheduler<R> {
    /// Create a scheduler over auto-keyed jobs (`0, 1, 2, ...`).
    ///
    /// Fails with [`SchedulerError::InvalidInput`] if any runnable is already running.
    pub fn new<I>(runnables: I, config: &PoolConfig) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = R>,
    {
        Self::build(runnables.into_iter().map(|r| (None, r)), config)
    }

    /// Create a scheduler over explicitly keyed jobs.
    ///
    /// Fails with [`SchedulerError::InvalidInput`] if any runnable is already
    /// running or a key appears twice.
    pub fn keyed<K, I>(jobs: I, config: &PoolConfig) -> Result<Self, SchedulerError>
    where
        K: Into<JobKey>,
        I: IntoIterator<Item = (K, R)>,
    {
        Self::build(jobs.into_iter().map(|(k, r)| (Some(k.into()), r)), config)
    }

    fn build<I>(jobs: I, config: &PoolConfig) -> Result<Self, SchedulerError>
    where
        I: Iterator<Item = (Option<JobKey>, R)>,
    {
        let mut scheduler = Self {
            jobs: IndexMap::new(),
            admitted_at: Vec::new(),
            waiting: VecDeque::new(),
            running: Vec::new(),
            start_failed: VecDeque::new(),
            done: Vec::new(),
            errors: BTreeMap::new(),
            limit: config.effective_limit(),
            poll_interval: config.poll_interval(),
            backoff: config.backoff(),
            require_success: config.require_success,
            next_index: 0,
            state: IterationState::NotStarted,
            current: None,
            metrics: SchedulerMetrics::default(),
        };

        for (position, (key, runnable)) in jobs.enumerate() {
            if runnable.is_running() {
                let which = key
                    .as_ref()
                    .map_or_else(|| format!("#{position}"), |k| k.to_string());
                return Err(SchedulerError::InvalidInput(format!(
                    "job {which} ({}) is already running",
                    runnable.label()
                )));
            }
            match key {
                Some(key) => scheduler.insert_keyed(key, runnable).map_err(|e| match e {
                    SchedulerError::DuplicateKey(k) => {
                        SchedulerError::InvalidInput(format!("duplicate job key {k} in input"))
                    }
                    other => other,
                })?,
                None => {
                    scheduler.insert(runnable)?;
                }
            }
        }

        debug!(
            jobs = scheduler.jobs.len(),
            limit = ?scheduler.limit,
            "scheduler created"
        );
        Ok(scheduler)
    }

    // ── Fluent configuration ────────────────────────────────────────

    /// Cap the number of concurrently running jobs. 0 removes the cap.
    ///
    /// Meant for setup; a cap below the number of jobs already running is
    /// ignored with a warning. Use [`set_limit`](Self::set_limit) to handle
    /// that case.
    pub fn limit(mut self, n: usize) -> Self {
        if let Err(e) = self.set_limit(n) {
            warn!(error = %e, "limit not applied");
        }
        self
    }

    /// Emit [`Progress::Idle`](crate::Progress::Idle) when nothing finishes within `interval`.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.set_poll_interval(Some(interval));
        self
    }

    /// Whether a non-zero exit is recorded as [`JobError::AbnormalExit`].
    pub fn require_success(mut self, require: bool) -> Self {
        self.require_success = require;
        self
    }

    /// Override the sleep between empty scans (default [`DEFAULT_BACKOFF`](crate::DEFAULT_BACKOFF)).
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Change the limit mid-iteration. Raising it admits waiting jobs at once.
    ///
    /// Running jobs cannot be stopped, so a cap below [`running_len`](Self::running_len)
    /// fails with [`SchedulerError::InvalidInput`] and leaves the limit unchanged.
    pub fn set_limit(&mut self, n: usize) -> Result<(), SchedulerError> {
        if n > 0 && n < self.running.len() {
            return Err(SchedulerError::InvalidInput(format!(
                "limit {n} is below the {} jobs already running",
                self.running.len()
            )));
        }
        self.limit = (n > 0).then_some(n);
        if self.state == IterationState::Yielding {
            self.admit();
        }
        Ok(())
    }

    pub fn set_poll_interval(&mut self, interval: Option<Duration>) {
        self.poll_interval = interval;
    }

    // ── Insertion ───────────────────────────────────────────────────

    /// Add a job under the next auto-assigned index and return its key.
    pub fn insert(&mut self, runnable: R) -> Result<JobKey, SchedulerError> {
        let key = JobKey::Index(self.next_index);
        self.insert_keyed(key.clone(), runnable)?;
        Ok(key)
    }

    /// Add a job under a caller-chosen key.
    ///
    /// Fails with [`SchedulerError::DuplicateKey`] if the key was ever used by
    /// this scheduler, and with [`SchedulerError::InvalidInput`] for
    /// `Index(usize::MAX)`, which would leave no index for the next auto key.
    /// Either way all state is unchanged. During iteration the job is
    /// admitted straight away when a slot is free.
    pub fn insert_keyed(
        &mut self,
        key: impl Into<JobKey>,
        runnable: R,
    ) -> Result<(), SchedulerError> {
        let key = key.into();
        if self.jobs.contains_key(&key) {
            return Err(SchedulerError::DuplicateKey(key));
        }
        if let JobKey::Index(i) = &key {
            let Some(after) = i.checked_add(1) else {
                return Err(SchedulerError::InvalidInput(format!(
                    "index key {i} leaves no room for auto-assigned keys"
                )));
            };
            self.next_index = self.next_index.max(after);
        }

        debug!(key = %key, job = %runnable.label(), "job inserted");
        let (position, _) = self.jobs.insert_full(key, runnable);
        self.admitted_at.push(None);

        if self.state == IterationState::Yielding {
            self.waiting.push_back(position);
            self.admit();
        }
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The failure captured for `key`, or for the most recently yielded job
    /// when `key` is `None`.
    pub fn last_error(&self, key: Option<&JobKey>) -> Option<&JobError> {
        let position = match key {
            Some(key) => self.jobs.get_index_of(key)?,
            None => self.current?,
        };
        self.errors.get(&position)
    }

    /// Every captured failure, in insertion order of the jobs.
    pub fn errors(&self) -> impl Iterator<Item = (&JobKey, &JobError)> {
        self.errors.iter().filter_map(|(&position, err)| {
            self.jobs.get_index(position).map(|(key, _)| (key, err))
        })
    }

    /// Key of the most recently yielded job.
    pub fn current_key(&self) -> Option<&JobKey> {
        self.current
            .and_then(|position| self.jobs.get_index(position))
            .map(|(key, _)| key)
    }

    pub fn job(&self, key: &JobKey) -> Option<&R> {
        self.jobs.get(key)
    }

    pub fn job_mut(&mut self, key: &JobKey) -> Option<&mut R> {
        self.jobs.get_mut(key)
    }

    /// All keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &JobKey> {
        self.jobs.keys()
    }

    /// Give the jobs back, in insertion order.
    pub fn into_jobs(self) -> impl Iterator<Item = (JobKey, R)> {
        self.jobs.into_iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn done_len(&self) -> usize {
        self.done.len()
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }
}

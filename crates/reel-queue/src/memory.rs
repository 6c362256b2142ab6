//! In-process queue with the same delivery semantics as the Redis one.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reel_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobOptions, JobSummary, QueuedJob, TranscodeJob};
use crate::queue::{failure_outcome, Claim, FailureOutcome, QueueConfig, QueueCounts, WorkQueue, STALLED_ERROR};

struct Entry {
    job: QueuedJob,
    state: JobState,
    seq: u64,
    token: Option<String>,
    /// Leases that expired without a complete or fail
    stalled: u32,
    last_error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.job.id.clone(),
            state: self.state,
            attempts_made: self.job.attempts_made,
            last_error: self.last_error.clone(),
            finished_at: self.finished_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    seq: u64,
    jobs: HashMap<JobId, Entry>,
    wait: BTreeMap<(u32, u64), JobId>,
    delayed: Vec<(Instant, JobId)>,
    active: HashMap<JobId, Instant>,
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl Inner {
    fn push_wait(&mut self, id: &JobId) {
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.state = JobState::Waiting;
            entry.token = None;
            self.wait.insert((entry.job.options.priority, entry.seq), id.clone());
        }
    }

    /// Move due delayed jobs and expired leases back to waiting.
    ///
    /// A job whose lease expires more than `config.max_stalled` times is
    /// moved to failed instead.
    fn promote(&mut self, now: Instant, config: &QueueConfig) {
        let (due, pending): (Vec<_>, Vec<_>) = self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = pending;
        for (_, id) in due {
            self.push_wait(&id);
        }

        let expired: Vec<JobId> = self
            .active
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.active.remove(&id);
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            entry.stalled += 1;
            if entry.stalled > config.max_stalled {
                warn!(job_id = %id, stalled = entry.stalled, "Lease expired too often, job failed");
                entry.state = JobState::Failed;
                entry.token = None;
                entry.last_error = Some(STALLED_ERROR.to_string());
                entry.finished_at = Some(Utc::now());
                self.retire(&id, JobState::Failed, config.keep_failed);
            } else {
                warn!(job_id = %id, stalled = entry.stalled, "Lease expired, job returned to waiting");
                self.push_wait(&id);
            }
        }
    }

    fn owns(&self, claim: &Claim) -> bool {
        self.active.contains_key(claim.job_id())
            && self
                .jobs
                .get(claim.job_id())
                .and_then(|e| e.token.as_deref())
                == Some(claim.token.as_str())
    }

    fn retire(&mut self, id: &JobId, state: JobState, keep: usize) {
        let history = match state {
            JobState::Completed => &mut self.completed,
            _ => &mut self.failed,
        };
        history.push_front(id.clone());
        let mut evicted = Vec::new();
        while history.len() > keep {
            if let Some(old) = history.pop_back() {
                evicted.push(old);
            }
        }
        for old in evicted {
            self.jobs.remove(&old);
        }
    }
}

/// `WorkQueue` held in process memory.
#[derive(Clone)]
pub struct MemoryQueue {
    config: QueueConfig,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Attempts recorded for a job still in the store.
    pub async fn attempts_made(&self, id: &JobId) -> Option<u32> {
        self.inner
            .lock()
            .await
            .jobs
            .get(id)
            .map(|e| e.job.attempts_made)
    }

    pub async fn state(&self, id: &JobId) -> Option<JobState> {
        self.inner.lock().await.jobs.get(id).map(|e| e.state)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, job: TranscodeJob, options: JobOptions) -> QueueResult<JobId> {
        let queued = QueuedJob::new(job, options);
        let id = queued.id.clone();
        let mut inner = self.inner.lock().await;

        inner.seq += 1;
        let seq = inner.seq;
        inner.jobs.insert(
            id.clone(),
            Entry {
                job: queued,
                state: JobState::Waiting,
                seq,
                token: None,
                stalled: 0,
                last_error: None,
                finished_at: None,
            },
        );

        if options.delay_ms > 0 {
            if let Some(entry) = inner.jobs.get_mut(&id) {
                entry.state = JobState::Delayed;
            }
            let ready_at = Instant::now() + Duration::from_millis(options.delay_ms);
            inner.delayed.push((ready_at, id.clone()));
        } else {
            inner.push_wait(&id);
        }

        debug!(job_id = %id, priority = options.priority, "Enqueued job");
        Ok(id)
    }

    async fn claim(&self) -> QueueResult<Option<Claim>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.promote(now, &self.config);

        let Some((_, id)) = inner.wait.pop_first() else {
            return Ok(None);
        };

        let token = Uuid::new_v4().to_string();
        inner.active.insert(id.clone(), now + self.config.lease);
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        entry.state = JobState::Active;
        entry.token = Some(token.clone());

        Ok(Some(Claim {
            job: entry.job.clone(),
            token,
        }))
    }

    async fn complete(&self, claim: &Claim) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.owns(claim) {
            return Err(QueueError::LeaseLost(claim.job_id().to_string()));
        }

        let id = claim.job_id().clone();
        inner.active.remove(&id);
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.state = JobState::Completed;
            entry.token = None;
            entry.finished_at = Some(Utc::now());
        }
        inner.retire(&id, JobState::Completed, self.config.keep_completed);

        info!(job_id = %id, "Job completed");
        Ok(())
    }

    async fn fail(&self, claim: &Claim, error: &str) -> QueueResult<FailureOutcome> {
        let mut inner = self.inner.lock().await;
        if !inner.owns(claim) {
            return Err(QueueError::LeaseLost(claim.job_id().to_string()));
        }

        let id = claim.job_id().clone();
        inner.active.remove(&id);
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        let outcome = failure_outcome(&entry.job);
        entry.job.attempts_made += 1;
        entry.last_error = Some(error.to_string());
        entry.token = None;

        match outcome {
            FailureOutcome::Retrying { delay, .. } => {
                entry.state = JobState::Delayed;
                inner.delayed.push((Instant::now() + delay, id.clone()));
            }
            FailureOutcome::Exhausted { .. } => {
                entry.state = JobState::Failed;
                entry.finished_at = Some(Utc::now());
                inner.retire(&id, JobState::Failed, self.config.keep_failed);
            }
        }

        Ok(outcome)
    }

    async fn extend_lease(&self, claim: &Claim) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.owns(claim) {
            return Ok(false);
        }
        inner
            .active
            .insert(claim.job_id().clone(), Instant::now() + self.config.lease);
        Ok(true)
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut inner = self.inner.lock().await;
        inner.promote(Instant::now(), &self.config);
        Ok(QueueCounts {
            waiting: inner.wait.len() as u64,
            delayed: inner.delayed.len() as u64,
            active: inner.active.len() as u64,
            completed: inner.completed.len() as u64,
            failed: inner.failed.len() as u64,
        })
    }

    async fn recent_completed(&self, limit: usize) -> QueueResult<Vec<JobSummary>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .completed
            .iter()
            .take(limit)
            .filter_map(|id| inner.jobs.get(id).map(Entry::summary))
            .collect())
    }

    async fn recent_failed(&self, limit: usize) -> QueueResult<Vec<JobSummary>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .failed
            .iter()
            .take(limit)
            .filter_map(|id| inner.jobs.get(id).map(Entry::summary))
            .collect())
    }
}

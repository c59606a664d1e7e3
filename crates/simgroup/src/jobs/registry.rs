//! Shared table of job records.

use super::{JobError, JobId, JobOutput, JobSnapshot, JobState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::debug;

struct JobRecord {
    state: watch::Sender<JobState>,
    submitted_at: DateTime<Utc>,
    output: Option<JobOutput>,
    error: Option<String>,
    /// Set on entering a terminal state; retention counts from here.
    finished_at: Option<Instant>,
}

impl JobRecord {
    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            state: *self.state.borrow(),
            submitted_at: self.submitted_at,
            output: self.output.clone(),
            error: self.error.clone(),
        }
    }

    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| now.duration_since(finished) >= retention)
    }
}

/// Job records shared between the runner's API and its workers.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    retention: Duration,
}

impl JobRegistry {
    /// Create an empty registry keeping terminal jobs for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Register a new job in the `Pending` state.
    pub async fn register(&self) -> JobId {
        let id = JobId::new();
        let (state, _) = watch::channel(JobState::Pending);
        let record = JobRecord {
            state,
            submitted_at: Utc::now(),
            output: None,
            error: None,
            finished_at: None,
        };
        self.jobs.write().await.insert(id, record);
        id
    }

    /// Drop a job that never made it onto the queue.
    pub(crate) async fn remove(&self, id: JobId) {
        self.jobs.write().await.remove(&id);
    }

    /// Move a job to `Started`.
    pub async fn mark_started(&self, id: JobId) {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            record.state.send_replace(JobState::Started);
        }
    }

    /// Move a job to its terminal state.
    pub async fn finish(&self, id: JobId, result: Result<JobOutput, String>) {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(&id) else {
            return;
        };
        let state = match result {
            Ok(output) => {
                record.output = Some(output);
                JobState::Success
            }
            Err(error) => {
                record.error = Some(error);
                JobState::Failure
            }
        };
        record.finished_at = Some(Instant::now());
        record.state.send_replace(state);
    }

    /// Current view of a job.
    ///
    /// Expired records are purged here as well as by the reaper, so an
    /// expired job is never observable.
    pub async fn snapshot(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let now = Instant::now();
        {
            let jobs = self.jobs.read().await;
            match jobs.get(&id) {
                None => return Err(JobError::UnknownJob(id)),
                Some(record) if !record.is_expired(now, self.retention) => {
                    return Ok(record.snapshot(id));
                }
                Some(_) => {}
            }
        }
        self.jobs.write().await.remove(&id);
        debug!(job_id = %id, "purged expired job on poll");
        Err(JobError::UnknownJob(id))
    }

    /// Views of every live job, oldest submission first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let now = Instant::now();
        let jobs = self.jobs.read().await;
        let mut snapshots: Vec<JobSnapshot> = jobs
            .iter()
            .filter(|(_, record)| !record.is_expired(now, self.retention))
            .map(|(id, record)| record.snapshot(*id))
            .collect();
        snapshots.sort_by_key(|s| s.submitted_at);
        snapshots
    }

    /// Subscribe to a job's state changes.
    pub async fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobState>, JobError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|record| record.state.subscribe())
            .ok_or(JobError::UnknownJob(id))
    }

    /// Remove every terminal job older than the retention window.
    ///
    /// Returns the number of records removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, record| !record.is_expired(now, self.retention));
        before - jobs.len()
    }

    /// Number of records currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the registry holds no records.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

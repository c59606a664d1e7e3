//! Worker pool executing clustering jobs.

use super::{ClusterRequest, JobError, JobId, JobOutput, JobRegistry, JobSnapshot};
use crate::cluster::{ClusterError, Clusterer};
use crate::config::{GroupingConfig, JobConfig};
use simgroup_core::{CoreError, NewGroup, SignatureStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Errors that fail a job.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("clustering failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("failed to persist group: {0}")]
    Store(#[from] CoreError),
}

/// Cluster a batch and commit the result as one new group.
///
/// Blocking; the runner calls it from the blocking pool. The group, its
/// file records and every vector record are written in a single commit,
/// so a failure leaves nothing behind.
pub fn run_pipeline(
    store: &dyn SignatureStore,
    config: &GroupingConfig,
    request: ClusterRequest,
) -> Result<JobOutput, PipelineError> {
    let clusterer = Clusterer::new(config);
    let clustering = clusterer.cluster(&request.documents)?;
    let vectors = clustering.vectors(&request.documents)?;

    let group = NewGroup {
        name: request.group_name,
        division: request.division,
        grouped_data: clustering.grouped_payload(&request.documents),
        files: request.files,
        params: clusterer.hasher().params(),
    };
    let record = store.commit_group(group, vectors)?;
    info!(
        group_id = record.id,
        group_name = %record.name,
        clusters = clustering.num_groups(),
        "committed group"
    );

    Ok(JobOutput {
        group_id: record.id,
        group_name: record.name,
        created_at: record.created_at,
        files: record.files,
        num_groups: clustering.num_groups(),
        num_documents: request.documents.len(),
    })
}

struct QueuedJob {
    id: JobId,
    request: ClusterRequest,
}

/// Runs clustering jobs on a pool of tokio worker tasks.
///
/// Must be started from within a tokio runtime.
pub struct JobRunner {
    registry: JobRegistry,
    queue: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
    reaper: JoinHandle<()>,
}

impl JobRunner {
    /// Validate `config` and spawn the workers and the reaper.
    pub fn start(store: Arc<dyn SignatureStore>, config: JobConfig) -> Result<Self, JobError> {
        config.validate()?;

        let registry = JobRegistry::new(config.retention);
        let (queue, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let grouping = Arc::new(config.grouping);

        let workers = (0..config.workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    registry.clone(),
                    Arc::clone(&store),
                    Arc::clone(&grouping),
                ))
            })
            .collect();
        let reaper = tokio::spawn(reaper_loop(registry.clone(), config.reap_interval));
        info!(workers = config.workers, "job runner started");

        Ok(Self {
            registry,
            queue,
            workers,
            reaper,
        })
    }

    /// Queue a request and return its job id without waiting for it to run.
    ///
    /// An empty batch is rejected here and no job is created. Waits only if
    /// the queue is full.
    pub async fn submit(&self, request: ClusterRequest) -> Result<JobId, JobError> {
        if request.documents.is_empty() {
            return Err(JobError::EmptyBatch);
        }

        let id = self.registry.register().await;
        let documents = request.documents.len();
        if self.queue.send(QueuedJob { id, request }).await.is_err() {
            self.registry.remove(id).await;
            return Err(JobError::QueueClosed);
        }
        info!(job_id = %id, documents, "job submitted");
        Ok(id)
    }

    /// Current state of a job.
    pub async fn poll(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.registry.snapshot(id).await
    }

    /// Every job still tracked, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.registry.list().await
    }

    /// Wait until a job reaches a terminal state and return its final view.
    pub async fn wait(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let mut rx = self.registry.subscribe(id).await?;
        rx.wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| JobError::UnknownJob(id))?;
        self.registry.snapshot(id).await
    }

    /// The registry backing this runner.
    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Stop accepting jobs, let workers drain the queue, then stop.
    pub async fn shutdown(self) {
        let Self {
            queue,
            workers,
            reaper,
            ..
        } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        reaper.abort();
        info!("job runner stopped");
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    registry: JobRegistry,
    store: Arc<dyn SignatureStore>,
    grouping: Arc<GroupingConfig>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(QueuedJob { id, request }) = next else {
            break;
        };

        registry.mark_started(id).await;
        info!(job_id = %id, worker, "job started");

        let store = Arc::clone(&store);
        let grouping = Arc::clone(&grouping);
        let outcome =
            tokio::task::spawn_blocking(move || run_pipeline(store.as_ref(), &grouping, request))
                .await;

        let result = match outcome {
            Ok(Ok(output)) => {
                info!(job_id = %id, group_id = output.group_id, "job succeeded");
                Ok(output)
            }
            Ok(Err(e)) => {
                error!(job_id = %id, error = %e, "job failed");
                Err(e.to_string())
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "job panicked");
                Err(format!("job aborted: {e}"))
            }
        };
        registry.finish(id, result).await;
    }
    debug!(worker, "worker stopped");
}

async fn reaper_loop(registry: JobRegistry, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let purged = registry.purge_expired().await;
        if purged > 0 {
            debug!(purged, "purged expired jobs");
        }
    }
}

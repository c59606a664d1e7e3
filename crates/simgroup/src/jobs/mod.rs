//! Background clustering jobs.
//!
//! A [`JobRunner`] accepts cluster requests, hands them to a pool of worker
//! tasks and lets callers poll each job's state by id:
//!
//! ```text
//! Pending -> Started -> Success
//!                    -> Failure
//! ```
//!
//! Finished jobs stay pollable for the configured retention window and are
//! then forgotten; polling a forgotten id is indistinguishable from polling
//! an id that never existed.

mod registry;
mod runner;

pub use registry::JobRegistry;
pub use runner::{run_pipeline, JobRunner, PipelineError};

use crate::config::ConfigError;
use crate::ingest::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simgroup_core::{FileInfo, GroupId};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// A worker is running it.
    Started,
    /// Finished; the group was committed.
    Success,
    /// Finished with an error; nothing was committed.
    Failure,
}

impl JobState {
    /// Whether the job has finished, successfully or not.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// A batch of documents to cluster into a new group.
#[derive(Debug, Clone)]
pub struct ClusterRequest {
    /// Documents in submission order.
    pub documents: Vec<Document>,
    /// Name of the group to create.
    pub group_name: String,
    /// Division the group belongs to.
    pub division: String,
    /// Upload records of the files the documents came from.
    pub files: Vec<FileInfo>,
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub group_id: GroupId,
    pub group_name: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileInfo>,
    /// Number of clusters found.
    pub num_groups: usize,
    /// Number of documents clustered.
    pub num_documents: usize,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    /// Set when `state` is `Success`.
    pub output: Option<JobOutput>,
    /// Set when `state` is `Failure`.
    pub error: Option<String>,
}

/// Errors returned by the job runner's own API.
///
/// Failures inside a job never surface here; they are recorded on the job
/// and reported through [`JobSnapshot::error`].
#[derive(Error, Debug)]
pub enum JobError {
    #[error("no documents were submitted")]
    EmptyBatch,

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("job queue is closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

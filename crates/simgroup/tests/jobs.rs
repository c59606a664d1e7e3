//! Job runner lifecycle tests.

use serde_json::json;
use simgroup::{
    ClusterRequest, Document, FileInfo, GroupId, GroupRecord, JobConfig, JobError,
    JobRunner, JobState, MemoryStore, SignatureStore, SqliteStore, VectorRecord,
};
use simgroup_core::{NewGroup, NewVector, VectorId};
use std::sync::Arc;
use std::time::Duration;

fn request(texts: &[&str]) -> ClusterRequest {
    ClusterRequest {
        documents: texts
            .iter()
            .map(|t| Document::new("batch.json", json!({ "text": t })))
            .collect(),
        group_name: "batch".into(),
        division: "ops".into(),
        files: vec![FileInfo::new("batch.json", 64)],
    }
}

/// Store that corrupts every commit so the backend fails partway through
/// writing vector records.
struct CorruptingStore {
    inner: SqliteStore,
}

impl SignatureStore for CorruptingStore {
    fn commit_group(
        &self,
        group: NewGroup,
        mut vectors: Vec<NewVector>,
    ) -> simgroup_core::Result<GroupRecord> {
        vectors.push(NewVector::new(vec![1, 2, 3], "wrong length"));
        self.inner.commit_group(group, vectors)
    }

    fn update_group(
        &self,
        group_id: GroupId,
        name: &str,
        grouped_data: &serde_json::Value,
    ) -> simgroup_core::Result<GroupRecord> {
        self.inner.update_group(group_id, name, grouped_data)
    }

    fn put(&self, group_id: GroupId, vector: &NewVector) -> simgroup_core::Result<VectorId> {
        self.inner.put(group_id, vector)
    }

    fn list_by_group(&self, group_id: GroupId) -> simgroup_core::Result<Vec<VectorRecord>> {
        self.inner.list_by_group(group_id)
    }

    fn get_group(&self, group_id: GroupId) -> simgroup_core::Result<Option<GroupRecord>> {
        self.inner.get_group(group_id)
    }

    fn list_groups(&self, division: Option<&str>) -> simgroup_core::Result<Vec<GroupRecord>> {
        self.inner.list_groups(division)
    }

    fn delete_group(&self, group_id: GroupId) -> simgroup_core::Result<bool> {
        self.inner.delete_group(group_id)
    }
}

#[tokio::test]
async fn test_job_succeeds_and_persists() {
    let store: Arc<dyn SignatureStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let runner = JobRunner::start(Arc::clone(&store), JobConfig::default()).unwrap();

    let id = runner
        .submit(request(&["hello world", "hello world!", "totally different text"]))
        .await
        .unwrap();

    let initial = runner.poll(id).await.unwrap();
    assert!(matches!(
        initial.state,
        JobState::Pending | JobState::Started | JobState::Success
    ));

    let done = runner.wait(id).await.unwrap();
    assert_eq!(done.state, JobState::Success);
    assert!(done.error.is_none());

    let output = done.output.unwrap();
    assert_eq!(output.group_name, "batch");
    assert_eq!(output.num_groups, 2);
    assert_eq!(output.files, vec![FileInfo::new("batch.json", 64)]);
    assert_eq!(store.list_by_group(output.group_id).unwrap().len(), 3);

    let group = store.get_group(output.group_id).unwrap().unwrap();
    assert_eq!(group.params.num_permutations, 128);
    assert_eq!(group.params.seed, 42);

    runner.shutdown().await;
}

#[tokio::test]
async fn test_empty_batch_fails_fast() {
    let store: Arc<dyn SignatureStore> = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(store, JobConfig::default()).unwrap();

    let result = runner.submit(request(&[])).await;
    assert!(matches!(result, Err(JobError::EmptyBatch)));
    assert!(runner.list().await.is_empty());

    runner.shutdown().await;
}

#[tokio::test]
async fn test_unknown_job() {
    let store: Arc<dyn SignatureStore> = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(store, JobConfig::default()).unwrap();

    let id = simgroup::JobId::new();
    assert!(matches!(runner.poll(id).await, Err(JobError::UnknownJob(x)) if x == id));
    assert!(matches!(runner.wait(id).await, Err(JobError::UnknownJob(_))));

    runner.shutdown().await;
}

#[tokio::test]
async fn test_clustering_failure_is_reported() {
    let store: Arc<dyn SignatureStore> = Arc::new(MemoryStore::new());
    let runner = JobRunner::start(Arc::clone(&store), JobConfig::default()).unwrap();

    let id = runner.submit(request(&["a", "b"])).await.unwrap();
    let done = runner.wait(id).await.unwrap();

    assert_eq!(done.state, JobState::Failure);
    assert!(done.output.is_none());
    assert!(!done.error.unwrap().is_empty());
    assert!(store.list_groups(None).unwrap().is_empty());

    runner.shutdown().await;
}

#[tokio::test]
async fn test_persistence_failure_leaves_nothing_behind() {
    let inner = SqliteStore::in_memory().unwrap();
    let store: Arc<dyn SignatureStore> = Arc::new(CorruptingStore { inner });
    let runner = JobRunner::start(Arc::clone(&store), JobConfig::default()).unwrap();

    let id = runner
        .submit(request(&["hello world", "hello world!", "totally different text"]))
        .await
        .unwrap();
    let done = runner.wait(id).await.unwrap();

    assert_eq!(done.state, JobState::Failure);
    let error = done.error.unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("persist"), "unexpected error: {error}");

    assert!(store.list_groups(None).unwrap().is_empty());
    assert!(store.list_by_group(1).unwrap().is_empty());

    runner.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_jobs() {
    let store: Arc<dyn SignatureStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let config = JobConfig::default().with_workers(3);
    let runner = JobRunner::start(Arc::clone(&store), config).unwrap();

    let mut ids = Vec::new();
    for i in 0..6 {
        let text = format!("document batch number {i}");
        ids.push(runner.submit(request(&[&text, "shared filler text"])).await.unwrap());
    }

    let mut group_ids = Vec::new();
    for id in &ids {
        let done = runner.wait(*id).await.unwrap();
        assert_eq!(done.state, JobState::Success);
        group_ids.push(done.output.unwrap().group_id);
    }
    group_ids.sort_unstable();
    group_ids.dedup();

    assert_eq!(group_ids.len(), 6);
    assert_eq!(store.list_groups(Some("ops")).unwrap().len(), 6);
    assert_eq!(runner.list().await.len(), 6);

    runner.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_results_expire_after_retention() {
    let store: Arc<dyn SignatureStore> = Arc::new(MemoryStore::new());
    let config = JobConfig::default()
        .with_retention(Duration::from_secs(3600))
        .with_reap_interval(Duration::from_secs(60));
    let runner = JobRunner::start(store, config).unwrap();

    let id = runner.submit(request(&["hello world"])).await.unwrap();
    assert_eq!(runner.wait(id).await.unwrap().state, JobState::Success);

    tokio::time::advance(Duration::from_secs(3599)).await;
    assert_eq!(runner.poll(id).await.unwrap().state, JobState::Success);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(matches!(runner.poll(id).await, Err(JobError::UnknownJob(_))));
    assert!(runner.list().await.is_empty());

    runner.shutdown().await;
}

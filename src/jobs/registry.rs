use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::models::{JobKind, JobMetadata, JobRecord, JobStatus, JobUpdate};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("job already exists: {0}")]
    AlreadyExists(String),
}

struct Entry {
    /// Creation order, breaks ties between identical start timestamps
    seq: u64,
    record: JobRecord,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    /// Entries sorted most recently started first
    fn newest_first(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.jobs.values().collect();
        entries.sort_by(|a, b| {
            b.record
                .started_at
                .cmp(&a.record.started_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries
    }
}

/// In-memory job store shared by the dispatcher, the pipeline and status queries.
///
/// Every operation runs under one registry-wide lock, so readers never see a
/// partially applied update. Records live for the lifetime of the process.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in `pending` state
    pub async fn create(
        &self,
        job_id: &str,
        kind: JobKind,
        metadata: JobMetadata,
    ) -> Result<JobRecord, RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(job_id) {
            return Err(RegistryError::AlreadyExists(job_id.to_string()));
        }

        let record = JobRecord::new(job_id, kind, metadata);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            job_id.to_string(),
            Entry {
                seq,
                record: record.clone(),
            },
        );

        debug!(job_id, %kind, "Job created");
        Ok(record)
    }

    /// Apply a partial update. Returns `None` when the job is unknown.
    ///
    /// Status changes that would leave a terminal state are ignored; the rest
    /// of the update still applies. The completion time is stamped once, on
    /// the first terminal status.
    pub async fn update(&self, job_id: &str, update: JobUpdate) -> Option<JobRecord> {
        let mut inner = self.inner.write().await;
        let record = &mut inner.jobs.get_mut(job_id)?.record;

        if let Some(next) = update.status {
            if record.status.can_transition_to(next) {
                record.status = next;
                if next.is_terminal() && record.completed_at.is_none() {
                    record.completed_at = Some(Utc::now());
                }
            } else {
                warn!(
                    job_id,
                    current = %record.status,
                    requested = %next,
                    "Ignoring invalid job status transition"
                );
            }
        }

        if let Some(progress) = update.progress {
            if progress.is_nan() {
                warn!(job_id, "Ignoring NaN progress");
            } else {
                record.progress = record.progress.max(progress.clamp(0.0, 100.0));
            }
        }

        if let Some(count) = update.records_processed {
            record.records_processed = count;
        }

        if let Some(error) = update.error {
            record.errors.push(error);
        }

        record.metadata.extend(update.metadata);

        Some(record.clone())
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        let inner = self.inner.read().await;
        inner.jobs.get(job_id).map(|entry| entry.record.clone())
    }

    /// All jobs, optionally of one kind, most recently started first
    pub async fn list(&self, kind: Option<JobKind>) -> Vec<JobRecord> {
        let inner = self.inner.read().await;
        inner
            .newest_first()
            .into_iter()
            .filter(|entry| kind.is_none_or(|k| entry.record.kind == k))
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Drop completed and failed jobs outside the `keep_last_n` most recent.
    ///
    /// Pending, running and timed-out jobs are never removed here.
    pub async fn cleanup(&self, keep_last_n: usize) -> usize {
        let mut inner = self.inner.write().await;

        let expired: Vec<String> = inner
            .newest_first()
            .into_iter()
            .skip(keep_last_n)
            .filter(|entry| {
                matches!(
                    entry.record.status,
                    JobStatus::Completed | JobStatus::Failed
                )
            })
            .map(|entry| entry.record.job_id.clone())
            .collect();

        for job_id in &expired {
            inner.jobs.remove(job_id);
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), keep_last_n, "Cleaned up old jobs");
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn registry_with(ids: &[&str]) -> JobRegistry {
        let registry = JobRegistry::new();
        for id in ids {
            registry
                .create(id, JobKind::Fetch, JobMetadata::new())
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let registry = JobRegistry::new();
        let mut metadata = JobMetadata::new();
        metadata.insert("profile_id".to_string(), json!("p-1"));

        let job = registry.create("job-1", JobKind::Fetch, metadata).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert!(job.completed_at.is_none());
        assert_eq!(registry.get("job-1").await.unwrap().metadata["profile_id"], "p-1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let registry = registry_with(&["job-1"]).await;
        registry
            .update("job-1", JobUpdate::new().progress(40.0))
            .await
            .unwrap();

        let err = registry
            .create("job-1", JobKind::Import, JobMetadata::new())
            .await
            .unwrap_err();

        assert_eq!(err, RegistryError::AlreadyExists("job-1".to_string()));
        let kept = registry.get("job-1").await.unwrap();
        assert_eq!(kept.kind, JobKind::Fetch);
        assert_eq!(kept.progress, 40.0);
    }

    #[tokio::test]
    async fn update_unknown_job_returns_none() {
        let registry = JobRegistry::new();
        let result = registry
            .update("ghost", JobUpdate::new().status(JobStatus::InProgress))
            .await;

        assert!(result.is_none());
        assert!(registry.get("ghost").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn progress_is_clamped() {
        let registry = registry_with(&["a", "b"]).await;

        let a = registry.update("a", JobUpdate::new().progress(250.0)).await.unwrap();
        assert_eq!(a.progress, 100.0);

        let b = registry.update("b", JobUpdate::new().progress(-5.0)).await.unwrap();
        assert_eq!(b.progress, 0.0);
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let registry = registry_with(&["a"]).await;
        registry.update("a", JobUpdate::new().progress(60.0)).await;
        let job = registry.update("a", JobUpdate::new().progress(10.0)).await.unwrap();
        assert_eq!(job.progress, 60.0);
    }

    #[tokio::test]
    async fn errors_are_appended() {
        let registry = registry_with(&["a"]).await;
        registry.update("a", JobUpdate::new().error("first")).await;
        let job = registry.update("a", JobUpdate::new().error("second")).await.unwrap();
        assert_eq!(job.errors, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let registry = registry_with(&["a"]).await;
        registry
            .update("a", JobUpdate::new().status(JobStatus::InProgress))
            .await;
        let done = registry
            .update("a", JobUpdate::new().status(JobStatus::Completed))
            .await
            .unwrap();
        let stamped = done.completed_at.unwrap();

        let after = registry
            .update(
                "a",
                JobUpdate::new()
                    .status(JobStatus::InProgress)
                    .error("late error"),
            )
            .await
            .unwrap();
        assert_eq!(after.status, JobStatus::Completed);
        assert_eq!(after.errors, vec!["late error"]);

        let failed = registry
            .update("a", JobUpdate::new().status(JobStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Completed);

        let repeated = registry
            .update("a", JobUpdate::new().status(JobStatus::Completed))
            .await
            .unwrap();
        assert_eq!(repeated.completed_at, Some(stamped));
    }

    #[tokio::test]
    async fn metadata_is_merged() {
        let registry = registry_with(&["a"]).await;
        registry
            .update("a", JobUpdate::new().metadata("rows_added", 3))
            .await;
        let job = registry
            .update("a", JobUpdate::new().metadata("rows_skipped", 1))
            .await
            .unwrap();
        assert_eq!(job.metadata_u64("rows_added"), 3);
        assert_eq!(job.metadata_u64("rows_skipped"), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filters_by_kind() {
        let registry = JobRegistry::new();
        registry.create("f1", JobKind::Fetch, JobMetadata::new()).await.unwrap();
        registry.create("i1", JobKind::Import, JobMetadata::new()).await.unwrap();
        registry.create("f2", JobKind::Fetch, JobMetadata::new()).await.unwrap();

        let all: Vec<String> = registry.list(None).await.into_iter().map(|j| j.job_id).collect();
        assert_eq!(all, vec!["f2", "i1", "f1"]);

        let fetches: Vec<String> = registry
            .list(Some(JobKind::Fetch))
            .await
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(fetches, vec!["f2", "f1"]);
    }

    #[tokio::test]
    async fn cleanup_keeps_recent_and_unfinished_jobs() {
        // oldest first: c1, p1, c2, p2, c3
        let registry = registry_with(&["c1", "p1", "c2", "p2", "c3"]).await;
        for id in ["c1", "c2", "c3"] {
            registry
                .update(id, JobUpdate::new().status(JobStatus::Completed))
                .await;
        }

        let removed = registry.cleanup(2).await;

        // retained window: c3, p2; beyond it c2 and c1 are completed, p1 stays
        assert_eq!(removed, 2);
        assert!(registry.get("c1").await.is_none());
        assert!(registry.get("c2").await.is_none());
        assert!(registry.get("p1").await.is_some());
        assert!(registry.get("p2").await.is_some());
        assert!(registry.get("c3").await.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_only_oldest_completed_beyond_window() {
        // oldest first: c1, p1, p2, c2, c3 -> window keeps c3, c2
        let registry = registry_with(&["c1", "p1", "p2", "c2", "c3"]).await;
        for id in ["c1", "c2", "c3"] {
            registry
                .update(id, JobUpdate::new().status(JobStatus::Completed))
                .await;
        }

        assert_eq!(registry.cleanup(2).await, 1);
        assert!(registry.get("c1").await.is_none());
        assert_eq!(registry.len().await, 4);
    }

    #[tokio::test]
    async fn cleanup_never_removes_timed_out_jobs() {
        let registry = registry_with(&["t1", "f1", "c1"]).await;
        registry
            .update("t1", JobUpdate::new().status(JobStatus::Timeout))
            .await;
        registry
            .update("f1", JobUpdate::new().status(JobStatus::Failed))
            .await;

        assert_eq!(registry.cleanup(0).await, 1);
        assert!(registry.get("t1").await.is_some());
        assert!(registry.get("f1").await.is_none());
        assert!(registry.get("c1").await.is_some());
    }

    #[tokio::test]
    async fn cleanup_with_small_registry_is_noop() {
        let registry = registry_with(&["a", "b"]).await;
        registry
            .update("a", JobUpdate::new().status(JobStatus::Completed))
            .await;
        assert_eq!(registry.cleanup(5).await, 0);
        assert_eq!(registry.len().await, 2);
    }
}

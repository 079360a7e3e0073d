use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use super::DispatchError;
use crate::jobs::{JobKind, JobRecord, JobRegistry, JobStatus, JobUpdate, generate_job_id};
use crate::observability::Metrics;
use crate::pipeline::JobRequest;

/// Attempts at drawing a fresh job id before giving up
const ID_ATTEMPTS: usize = 3;

/// A submitted job on its way to a worker
#[derive(Clone, Debug)]
pub struct JobEnvelope {
    pub job_id: String,
    pub request: JobRequest,
}

/// Receiving end of the work queue, shared by every worker.
///
/// Whichever worker is idle takes the next envelope, so a long run never
/// holds back jobs queued after it.
pub type JobQueue = Arc<Mutex<mpsc::Receiver<JobEnvelope>>>;

/// Dispatcher accepts ingestion requests and hands them to the worker pool
///
/// Flow:
/// 1. Request layer calls `dispatcher.submit(request)`
/// 2. The job record is created in `pending` state
/// 3. A JobEnvelope goes onto the shared work queue
/// 4. `submit` returns the job id without waiting for the run
///
/// The queue is bounded; a full queue rejects the job instead of
/// blocking the caller.
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    metrics: Arc<Metrics>,
    queue: mpsc::Sender<JobEnvelope>,
    num_workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher and the queue its `num_workers` workers pull from
    pub fn new(
        registry: Arc<JobRegistry>,
        metrics: Arc<Metrics>,
        num_workers: usize,
        queue_size: usize,
    ) -> (Self, JobQueue) {
        let num_workers = num_workers.max(1);
        let queue_size = queue_size.max(1);
        info!(num_workers, queue_size, "Creating dispatcher");

        let (tx, rx) = mpsc::channel(queue_size);
        let dispatcher = Self {
            registry,
            metrics,
            queue: tx,
            num_workers,
        };

        (dispatcher, Arc::new(Mutex::new(rx)))
    }

    /// Create the job and schedule its run; returns the new job id
    pub async fn submit(&self, request: JobRequest) -> Result<String, DispatchError> {
        let job_id = self.create_job(&request).await?;
        self.metrics.job_submitted();

        let envelope = JobEnvelope {
            job_id: job_id.clone(),
            request,
        };

        match self.queue.try_send(envelope) {
            Ok(()) => {
                info!(job_id = %job_id, "Job queued");
                Ok(job_id)
            }
            Err(TrySendError::Full(_)) => {
                warn!(job_id = %job_id, "Work queue full, rejecting job");
                self.reject(&job_id, "dispatch queue is full").await;
                Err(DispatchError::QueueFull(job_id))
            }
            Err(TrySendError::Closed(_)) => {
                warn!(job_id = %job_id, "Work queue closed, job not delivered");
                self.reject(&job_id, "no worker available").await;
                Err(DispatchError::WorkersUnavailable(job_id))
            }
        }
    }

    /// Latest registry state of a job
    pub async fn status(&self, job_id: &str) -> Option<JobRecord> {
        self.registry.get(job_id).await
    }

    pub async fn list(&self, kind: Option<JobKind>) -> Vec<JobRecord> {
        self.registry.list(kind).await
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// False once every worker has stopped and the queue is closed
    pub fn health_check(&self) -> bool {
        !self.queue.is_closed()
    }

    async fn create_job(&self, request: &JobRequest) -> Result<String, DispatchError> {
        let kind = request.kind();
        let mut attempt = 1;

        loop {
            let job_id = generate_job_id(kind);
            match self.registry.create(&job_id, kind, request.metadata()).await {
                Ok(_) => return Ok(job_id),
                Err(e) if attempt >= ID_ATTEMPTS => return Err(e.into()),
                Err(_) => {
                    warn!(job_id = %job_id, attempt, "Job id collision, drawing a new id");
                    attempt += 1;
                }
            }
        }
    }

    async fn reject(&self, job_id: &str, reason: &str) {
        self.metrics.job_failed();
        self.registry
            .update(
                job_id,
                JobUpdate::new().status(JobStatus::Failed).error(reason),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::fetch_request;

    fn dispatcher(workers: usize, size: usize) -> (Dispatcher, JobQueue) {
        Dispatcher::new(Arc::new(JobRegistry::new()), Arc::new(Metrics::new()), workers, size)
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let (dispatcher, queue) = dispatcher(1, 10);

        let job_id = dispatcher.submit(fetch_request("p1")).await.unwrap();

        assert!(job_id.starts_with("fetch_"));
        let job = dispatcher.status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.metadata["profile_id"], "p1");

        let envelope = queue.lock().await.recv().await.unwrap();
        assert_eq!(envelope.job_id, job_id);
        assert_eq!(envelope.request, fetch_request("p1"));
    }

    #[tokio::test]
    async fn test_queue_preserves_submission_order() {
        let (dispatcher, queue) = dispatcher(3, 10);

        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(dispatcher.submit(fetch_request(&format!("p{}", i))).await.unwrap());
        }

        let mut rx = queue.lock().await;
        for id in ids {
            assert_eq!(rx.recv().await.unwrap().job_id, id);
        }
    }

    #[tokio::test]
    async fn test_full_queue_fails_job() {
        let (dispatcher, _queue) = dispatcher(1, 1);

        dispatcher.submit(fetch_request("p1")).await.unwrap();
        let err = dispatcher.submit(fetch_request("p2")).await.unwrap_err();

        let DispatchError::QueueFull(job_id) = err else {
            panic!("expected QueueFull, got {err:?}");
        };
        let job = dispatcher.status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec!["dispatch queue is full"]);
    }

    #[tokio::test]
    async fn test_closed_queue_fails_job() {
        let (dispatcher, queue) = dispatcher(1, 10);
        drop(queue);

        assert!(!dispatcher.health_check());
        let err = dispatcher.submit(fetch_request("p1")).await.unwrap_err();
        assert!(matches!(err, DispatchError::WorkersUnavailable(_)));
        assert_eq!(dispatcher.list(None).await[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_status_of_unknown_job() {
        let (dispatcher, _queue) = dispatcher(2, 10);
        assert!(dispatcher.status("fetch_missing").await.is_none());
        assert_eq!(dispatcher.num_workers(), 2);
    }
}

use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::JobQueue;
use crate::pipeline::{IngestionPipeline, PipelineError};

/// Start `count` workers pulling from the shared queue.
///
/// Each job runs in its own spawned task so a panic inside a run ends only
/// that job (as `failed`). Workers exit once the queue is closed and drained.
pub fn spawn_workers(
    queue: JobQueue,
    count: usize,
    pipeline: Arc<IngestionPipeline>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker_id| tokio::spawn(worker_loop(worker_id, queue.clone(), pipeline.clone())))
        .collect()
}

async fn worker_loop(worker_id: usize, queue: JobQueue, pipeline: Arc<IngestionPipeline>) {
    info!(worker_id, "Worker started");

    loop {
        // the lock is only held while waiting for the next envelope
        let next = queue.lock().await.recv().await;
        let Some(envelope) = next else {
            break;
        };
        let job_id = envelope.job_id.clone();
        debug!(worker_id, job_id = %job_id, "Worker picked up job");

        let run = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(&envelope.job_id, &envelope.request).await })
        };

        match run.await {
            Ok(status) => debug!(worker_id, job_id = %job_id, %status, "Job run finished"),
            Err(e) => {
                let reason = if e.is_panic() {
                    format!("job run panicked: {}", panic_message(e.into_panic()))
                } else {
                    "job run was cancelled".to_string()
                };
                error!(worker_id, job_id = %job_id, reason = %reason, "Job run aborted");
                pipeline.fail(&job_id, &PipelineError::Task(reason)).await;
            }
        }
    }

    info!(worker_id, "Work queue closed, stopping");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::jobs::{JobRecord, JobStatus};
    use crate::pipeline::testing::{FakeReports, Harness, fetch_request, harness};
    use std::time::Duration;

    async fn wait_terminal(h: &Harness, job_id: &str) -> JobRecord {
        for _ in 0..200 {
            if let Some(job) = h.registry.get(job_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    fn start_with(reports: FakeReports, workers: usize) -> (Harness, Dispatcher) {
        let h = harness(Arc::new(reports));
        let (dispatcher, queue) =
            Dispatcher::new(h.registry.clone(), h.metrics.clone(), workers, 10);
        spawn_workers(queue, workers, h.pipeline.clone());
        (h, dispatcher)
    }

    fn start(reports: FakeReports) -> (Harness, Dispatcher) {
        start_with(reports, 1)
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let (h, dispatcher) = start(FakeReports::Rows(Vec::new()));

        let job_id = dispatcher.submit(fetch_request("p1")).await.unwrap();
        let job = wait_terminal(&h, &job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
    }

    #[tokio::test]
    async fn panicking_run_fails_job_and_worker_survives() {
        let (h, dispatcher) = start(FakeReports::Panic);

        let first = dispatcher.submit(fetch_request("p1")).await.unwrap();
        let job = wait_terminal(&h, &first).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.errors[0].contains("report source exploded"));

        let second = dispatcher.submit(fetch_request("p2")).await.unwrap();
        assert_eq!(wait_terminal(&h, &second).await.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn idle_worker_takes_jobs_queued_behind_a_long_run() {
        let reports = FakeReports::SlowProfile("slow".to_string(), Duration::from_secs(3));
        let (h, dispatcher) = start_with(reports, 2);

        let slow = dispatcher.submit(fetch_request("slow")).await.unwrap();
        let fast = vec![
            dispatcher.submit(fetch_request("fast-1")).await.unwrap(),
            dispatcher.submit(fetch_request("fast-2")).await.unwrap(),
            dispatcher.submit(fetch_request("fast-3")).await.unwrap(),
        ];

        for job_id in &fast {
            let job = tokio::time::timeout(Duration::from_secs(1), wait_terminal(&h, job_id))
                .await
                .expect("fast job stuck behind the slow one");
            assert_eq!(job.status, JobStatus::Completed);
        }
        assert_eq!(
            h.registry.get(&slow).await.unwrap().status,
            JobStatus::InProgress
        );
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}

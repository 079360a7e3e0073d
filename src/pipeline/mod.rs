//! Ingestion pipeline: drives one job from `pending` to a terminal state.
//!
//! A fetch job pulls a report through a [`ReportSource`]; an import job reads
//! an uploaded spreadsheet from [`StorageClient`]. Both map their rows onto
//! canonical records, persist them through a [`PerformanceStore`] and report
//! every step to the [`JobRegistry`].

mod fetch;
mod import;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ads::{AdsError, ReportSource};
use crate::jobs::{JobKind, JobMetadata, JobRegistry, JobStatus, JobUpdate};
use crate::observability::Metrics;
use crate::spreadsheet::SpreadsheetError;
use crate::storage::{StorageClient, StorageError};
use crate::store::{PerformanceStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ads(#[from] AdsError),

    #[error("Persisting records failed: {0}")]
    Store(#[from] StoreError),

    #[error("Reading upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Terminal status a job ends in when its run fails with this error
    pub fn job_status(&self) -> JobStatus {
        match self {
            PipelineError::Ads(e) if e.is_timeout() => JobStatus::Timeout,
            _ => JobStatus::Failed,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Parameters of a report fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    pub profile_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub report_type: Option<String>,
}

/// Parameters of a spreadsheet import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportParams {
    pub profile_id: String,
    pub upload_id: String,
    /// Storage key of the uploaded file; its extension selects the parser
    pub upload_key: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Work handed from the dispatcher to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobRequest {
    Fetch(FetchParams),
    Import(ImportParams),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Fetch(_) => JobKind::Fetch,
            JobRequest::Import(_) => JobKind::Import,
        }
    }

    pub fn profile_id(&self) -> &str {
        match self {
            JobRequest::Fetch(p) => &p.profile_id,
            JobRequest::Import(p) => &p.profile_id,
        }
    }

    /// Context recorded on the job record at creation
    pub fn metadata(&self) -> JobMetadata {
        let mut metadata = JobMetadata::new();
        metadata.insert("profile_id".into(), json!(self.profile_id()));
        match self {
            JobRequest::Fetch(p) => {
                metadata.insert("start_date".into(), json!(p.start_date));
                metadata.insert("end_date".into(), json!(p.end_date));
                if let Some(report_type) = &p.report_type {
                    metadata.insert("report_type".into(), json!(report_type));
                }
            }
            JobRequest::Import(p) => {
                metadata.insert("upload_id".into(), json!(p.upload_id));
                metadata.insert("upload_key".into(), json!(p.upload_key));
                if let Some(start) = p.start_date {
                    metadata.insert("start_date".into(), json!(start));
                }
                if let Some(end) = p.end_date {
                    metadata.insert("end_date".into(), json!(end));
                }
            }
        }
        metadata
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on waiting for a remote report
    pub max_wait: Duration,
    /// Report type used when a fetch request names none
    pub report_type: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            report_type: "KEYWORDS".to_string(),
        }
    }
}

pub struct IngestionPipeline {
    registry: Arc<JobRegistry>,
    reports: Arc<dyn ReportSource>,
    uploads: StorageClient,
    store: Arc<dyn PerformanceStore>,
    metrics: Arc<Metrics>,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    pub fn new(
        registry: Arc<JobRegistry>,
        reports: Arc<dyn ReportSource>,
        uploads: StorageClient,
        store: Arc<dyn PerformanceStore>,
        metrics: Arc<Metrics>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            reports,
            uploads,
            store,
            metrics,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Run one job to completion and return the terminal status it reached.
    ///
    /// Errors never escape: they end the job as `failed`, or as `timeout`
    /// when the remote report did not finish in time.
    pub async fn run(&self, job_id: &str, request: &JobRequest) -> JobStatus {
        self.advance(
            job_id,
            JobUpdate::new().status(JobStatus::InProgress).progress(0.0),
        )
        .await;
        info!(job_id, kind = %request.kind(), profile_id = request.profile_id(), "Job started");

        let outcome = match request {
            JobRequest::Fetch(params) => self.run_fetch(job_id, params).await,
            JobRequest::Import(params) => self.run_import(job_id, params).await,
        };

        match outcome {
            Ok(()) => {
                self.metrics.job_completed();
                JobStatus::Completed
            }
            Err(e) => self.fail(job_id, &e).await,
        }
    }

    /// Record a run failure on the job
    pub async fn fail(&self, job_id: &str, err: &PipelineError) -> JobStatus {
        let status = err.job_status();
        match status {
            JobStatus::Timeout => {
                warn!(job_id, error = %err, "Job timed out");
                self.metrics.job_timed_out();
            }
            _ => {
                error!(job_id, error = %err, "Job failed");
                self.metrics.job_failed();
            }
        }

        self.advance(job_id, JobUpdate::new().status(status).error(err.to_string()))
            .await;
        status
    }

    async fn advance(&self, job_id: &str, update: JobUpdate) {
        if self.registry.update(job_id, update).await.is_none() {
            warn!(job_id, "Job vanished from registry during run");
        }
    }
}

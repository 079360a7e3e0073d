//! Request and response bodies of the HTTP API.
//!
//! Ingestion is asynchronous: `POST /api/fetch` and `POST /api/import`
//! answer `202 Accepted` with a job id, and the matching status endpoint is
//! polled until the job reaches a terminal state.
//!
//! ```json
//! POST /api/fetch
//! {"profile_id": "3141592653", "start_date": "2025-11-01", "end_date": "2025-11-07"}
//!
//! 202 Accepted
//! {"job_id": "fetch_20251108_093000_1a2b3c4d", "status": "pending",
//!  "message": "Fetch job started. Monitor progress at /api/fetch/status/fetch_20251108_093000_1a2b3c4d"}
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::{
    DataSources, KeywordPerformance, KeywordSort, PerformanceSummary, SortOrder, TrendGrouping,
    TrendPoint,
};
use crate::jobs::{JobKind, JobMetadata, JobRecord, JobStatus};
use crate::observability::MetricsSnapshot;
use crate::spreadsheet::Layout;

#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    /// Falls back to `ads.default_profile_id` when omitted
    #[serde(default)]
    pub profile_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub report_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub upload_id: String,
    pub profile_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Body of both `202 Accepted` answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub records_fetched: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for FetchStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            records_fetched: job.records_processed,
            errors: job.errors,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub rows_processed: u64,
    pub rows_added: u64,
    pub rows_skipped: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for ImportStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            rows_processed: job.metadata_u64("rows_processed"),
            rows_added: job.metadata_u64("rows_added"),
            rows_skipped: job.metadata_u64("rows_skipped"),
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            errors: job.errors,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub upload_id: String,
    pub filename: String,
    pub file_type: String,
    pub size_bytes: u64,
    pub upload_key: String,
    pub uploaded_at: DateTime<Utc>,
    pub message: String,
}

/// `GET /api/upload/{upload_id}/preview`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePreviewResponse {
    pub upload_id: String,
    pub profile_id: String,
    pub filename: String,
    /// Data rows in the sheet, header excluded
    pub total_rows: usize,
    pub preview_rows: Vec<PreviewRow>,
    pub detected_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub layout: Option<Layout>,
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRow {
    pub row_number: usize,
    pub data: BTreeMap<String, String>,
}

/// Date range of the performance read endpoints, both ends inclusive
#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub profile_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(flatten)]
    pub summary: PerformanceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordListResponse {
    pub profile_id: String,
    pub keywords: Vec<KeywordPerformance>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub sort_by: KeywordSort,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendResponse {
    pub profile_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub group_by: TrendGrouping,
    pub data_points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceResponse {
    pub profile_id: String,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
    #[serde(flatten)]
    pub sources: DataSources,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsQuery {
    #[serde(default)]
    pub kind: Option<String>,
}

/// One entry of `GET /api/jobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: f64,
    pub records_processed: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JobMetadata,
}

impl From<JobRecord> for JobSummary {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            records_processed: job.records_processed,
            errors: job.errors,
            started_at: job.started_at,
            completed_at: job.completed_at,
            metadata: job.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub total: usize,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{
    error::ApiError,
    models::{
        DataSourceResponse, DateRangeQuery, FetchRequest, FetchStatusResponse,
        FilePreviewResponse, HealthResponse, ImportRequest, ImportStatusResponse,
        JobAcceptedResponse, JobListResponse, JobSummary, JobsQuery, KeywordListResponse,
        KeywordsQuery, PreviewRow, SummaryResponse, TrendResponse, TrendsQuery, UploadResponse,
    },
    state::AppState,
    utils,
};
use crate::analytics::{self, KeywordQuery, KeywordSort, SortOrder, TrendGrouping};
use crate::jobs::{JobKind, JobStatus};
use crate::pipeline::{FetchParams, ImportParams, JobRequest};
use crate::records::CanonicalPerformanceRecord;
use crate::spreadsheet::{ColumnCheck, SheetPreview, preview_sheet, validate_columns};
use crate::storage::{generate_upload_id, upload_key};

/// Rows shown by the upload preview
const PREVIEW_ROWS: usize = 10;

/// Upper bound on `page_size` of the keyword listing
const MAX_PAGE_SIZE: usize = 500;

/// Start a report fetch (POST /api/fetch)
///
/// Returns 202 with the job id right away; the report is requested,
/// polled and ingested by a worker.
pub async fn trigger_fetch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: FetchRequest = read_json(&headers, &body)?;

    let profile_id = utils::require_identifier(
        "profile_id",
        request
            .profile_id
            .as_deref()
            .or(state.config.ads.default_profile_id.as_deref()),
    )?;
    utils::validate_date_range(request.start_date, request.end_date)?;
    let report_type = request
        .report_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let job_id = state
        .dispatcher
        .submit(JobRequest::Fetch(FetchParams {
            profile_id: profile_id.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            report_type,
        }))
        .await?;

    info!(
        job_id = %job_id,
        profile_id = %profile_id,
        start = %request.start_date,
        end = %request.end_date,
        "Fetch job accepted"
    );

    let message = format!(
        "Fetch job started. Monitor progress at /api/fetch/status/{}",
        job_id
    );
    Ok(accepted(job_id, message))
}

/// GET /api/fetch/status/{job_id}
pub async fn fetch_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .dispatcher
        .status(&job_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok(Json(FetchStatusResponse::from(job)))
}

/// Store a spreadsheet for a later import (POST /api/upload, multipart)
///
/// Expects a `file` part and a `profile_id` part.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file = None;
    let mut profile_id = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or_else(|| ApiError::InvalidPayload("file part has no filename".into()))?;
                let content_type = field.content_type().map(str::to_owned);
                let data = field.bytes().await?;
                file = Some((filename, content_type, data));
            }
            Some("profile_id") => profile_id = Some(field.text().await?),
            _ => {}
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| ApiError::InvalidPayload("missing 'file' part".into()))?;
    let profile_id = utils::require_identifier(
        "profile_id",
        profile_id
            .as_deref()
            .or(state.config.ads.default_profile_id.as_deref()),
    )?;

    let ext = utils::upload_extension(&filename)?;
    utils::check_upload_content_type(&ext, content_type.as_deref())?;
    utils::validate_upload_size(data.len(), state.max_upload_bytes())?;

    let upload_id = generate_upload_id();
    let key = upload_key(&profile_id, &upload_id, &ext);
    let stored = state.uploads.upload(&key, data.to_vec()).await?;

    info!(
        upload_id = %upload_id,
        profile_id = %profile_id,
        filename = %filename,
        size = stored.size,
        "File uploaded"
    );

    let response = UploadResponse {
        message: format!(
            "File uploaded successfully. Use upload_id '{}' to import.",
            upload_id
        ),
        upload_id,
        filename,
        file_type: format!(".{}", ext),
        size_bytes: stored.size as u64,
        upload_key: stored.key,
        uploaded_at: Utc::now(),
    };

    Ok(Json(response))
}

/// First rows and column check of a stored upload
/// (GET /api/upload/{upload_id}/preview)
pub async fn preview_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = utils::require_identifier("upload_id", Some(&upload_id))?;
    let (profile_id, key) = state
        .uploads
        .find_upload(&upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload {upload_id}")))?;

    let bytes = state.uploads.download(&key).await?;
    let filename = key.rsplit('/').next().unwrap_or(&key).to_string();
    let preview: SheetPreview = {
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || preview_sheet(&bytes, &filename, PREVIEW_ROWS))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??
    };

    let mut validation_errors = Vec::new();
    if !preview.check.missing.is_empty() {
        validation_errors.push(format!(
            "Missing required columns: {}",
            preview.check.missing.join(", ")
        ));
    }

    Ok(Json(FilePreviewResponse {
        upload_id,
        profile_id,
        filename,
        total_rows: preview.total_rows,
        preview_rows: preview
            .rows
            .into_iter()
            .map(|(row_number, data)| PreviewRow { row_number, data })
            .collect(),
        detected_columns: preview.check.detected,
        missing_columns: preview.check.missing,
        layout: preview.layout,
        validation_errors,
    }))
}

/// Import a previously uploaded spreadsheet (POST /api/import)
///
/// Headers are checked before the job is created, so a sheet with
/// missing columns is rejected with 400 instead of becoming a failed job.
pub async fn trigger_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ImportRequest = read_json(&headers, &body)?;

    let profile_id = utils::require_identifier("profile_id", Some(&request.profile_id))?;
    let upload_id = utils::require_identifier("upload_id", Some(&request.upload_id))?;
    if let (Some(start), Some(end)) = (request.start_date, request.end_date) {
        utils::validate_date_range(start, end)?;
    }

    let key = state
        .uploads
        .locate_upload(&profile_id, &upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload {upload_id}")))?;

    let bytes = state.uploads.download(&key).await?;
    let check: ColumnCheck = {
        let key = key.clone();
        tokio::task::spawn_blocking(move || validate_columns(&bytes, &key))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??
    };
    if !check.missing.is_empty() {
        return Err(ApiError::InvalidPayload(format!(
            "missing required columns: {} (found: {})",
            check.missing.join(", "),
            check.detected.join(", ")
        )));
    }

    let job_id = state
        .dispatcher
        .submit(JobRequest::Import(ImportParams {
            profile_id: profile_id.clone(),
            upload_id: upload_id.clone(),
            upload_key: key,
            start_date: request.start_date,
            end_date: request.end_date,
        }))
        .await?;

    info!(job_id = %job_id, upload_id = %upload_id, profile_id = %profile_id, "Import job accepted");

    let message = format!(
        "Import job started. Monitor progress at /api/import/status/{}",
        job_id
    );
    Ok(accepted(job_id, message))
}

/// GET /api/import/status/{job_id}
pub async fn import_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .dispatcher
        .status(&job_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok(Json(ImportStatusResponse::from(job)))
}

/// GET /api/jobs?kind=fetch|import, most recent first
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|k| k.parse::<JobKind>())
        .transpose()
        .map_err(ApiError::InvalidPayload)?;

    let jobs: Vec<JobSummary> = state
        .dispatcher
        .list(kind)
        .await
        .into_iter()
        .map(JobSummary::from)
        .collect();

    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
    }))
}

/// Totals and averages over a date range (GET /api/performance/{profile_id}/summary)
pub async fn performance_summary(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let (profile_id, records) =
        load_range(&state, &profile_id, query.start_date, query.end_date).await?;

    Ok(Json(SummaryResponse {
        profile_id,
        start_date: query.start_date,
        end_date: query.end_date,
        summary: analytics::summarize(&records),
    }))
}

/// Per-keyword totals, sorted and paginated (GET /api/performance/{profile_id}/keywords)
pub async fn keyword_performance(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    query: Result<Query<KeywordsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    let sort_by = query
        .sort_by
        .as_deref()
        .map_or(Ok(KeywordSort::Spend), str::parse)
        .map_err(ApiError::InvalidPayload)?;
    let sort_order = query
        .sort_order
        .as_deref()
        .map_or(Ok(SortOrder::Desc), str::parse)
        .map_err(ApiError::InvalidPayload)?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(50);
    if page == 0 {
        return Err(ApiError::InvalidPayload("page starts at 1".into()));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ApiError::InvalidPayload(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let (profile_id, records) =
        load_range(&state, &profile_id, query.start_date, query.end_date).await?;
    let listing = analytics::keyword_performance(
        &records,
        KeywordQuery {
            sort_by,
            sort_order,
            page,
            page_size,
        },
    );

    Ok(Json(KeywordListResponse {
        profile_id,
        keywords: listing.keywords,
        total_count: listing.total_count,
        page,
        page_size,
        sort_by,
        sort_order,
    }))
}

/// Totals per day, week or month (GET /api/performance/{profile_id}/trends)
pub async fn performance_trends(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    query: Result<Query<TrendsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let group_by = query
        .group_by
        .as_deref()
        .map_or(Ok(TrendGrouping::Day), str::parse)
        .map_err(ApiError::InvalidPayload)?;

    let (profile_id, records) =
        load_range(&state, &profile_id, query.start_date, query.end_date).await?;

    Ok(Json(TrendResponse {
        profile_id,
        start_date: query.start_date,
        end_date: query.end_date,
        group_by,
        data_points: analytics::trends(&records, group_by),
    }))
}

/// Row counts by ingestion path (GET /api/performance/{profile_id}/sources)
pub async fn data_sources(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let (profile_id, records) =
        load_range(&state, &profile_id, query.start_date, query.end_date).await?;

    Ok(Json(DataSourceResponse {
        profile_id,
        date_range_start: query.start_date,
        date_range_end: query.end_date,
        sources: analytics::data_sources(&records),
    }))
}

/// Validated profile id and its stored rows within the range
async fn load_range(
    state: &AppState,
    profile_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(String, Vec<CanonicalPerformanceRecord>), ApiError> {
    let profile_id = utils::require_identifier("profile_id", Some(profile_id))?;
    utils::validate_date_range(start, end)?;

    let records = state.store.query(&profile_id, start, end).await?;
    debug!(profile_id = %profile_id, %start, %end, rows = records.len(), "Performance rows loaded");
    Ok((profile_id, records))
}

/// Health check endpoint (GET /api/health)
///
/// Returns 503 Service Unavailable if any component is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let workers = if state.dispatcher.health_check() {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("workers".to_string(), workers.to_string());

    let store = match state.store.count().await {
        Ok(_) => "healthy".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Performance store health check failed");
            "unhealthy".to_string()
        }
    };
    components.insert(format!("store_{}", state.store.backend()), store);
    components.insert(
        format!("uploads_{}", state.uploads.backend()),
        "healthy".to_string(),
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}

fn accepted(job_id: String, message: String) -> (StatusCode, Json<JobAcceptedResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            job_id,
            status: JobStatus::Pending,
            message,
        }),
    )
}

/// Decode a JSON body after checking its Content-Type.
///
/// Decompression already happened in `RequestDecompressionLayer`.
fn read_json<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    utils::parse_content_type(content_type)?;

    Ok(serde_json::from_slice(body)?)
}

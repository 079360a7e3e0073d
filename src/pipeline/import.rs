use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::{ImportParams, IngestionPipeline, PipelineError, Result};
use crate::jobs::{JobStatus, JobUpdate};
use crate::spreadsheet::{SheetOptions, parse_spreadsheet};

/// Row errors kept on the job record; the rest are only counted
const MAX_REPORTED_ROW_ERRORS: usize = 20;

impl IngestionPipeline {
    pub(super) async fn run_import(&self, job_id: &str, params: &ImportParams) -> Result<()> {
        let bytes = self.uploads.download(&params.upload_key).await?;
        debug!(job_id, key = %params.upload_key, size = bytes.len(), "Upload loaded");

        self.advance(job_id, JobUpdate::new().progress(10.0)).await;

        let options = SheetOptions {
            profile_id: params.profile_id.clone(),
            import_date: Utc::now().date_naive(),
            start_date: params.start_date,
            end_date: params.end_date,
        };
        let filename = params.upload_key.clone();
        let sheet = tokio::task::spawn_blocking(move || parse_spreadsheet(&bytes, &filename, &options))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;

        let parsed = sheet.records.len() as u64;
        let total = sheet.total_rows() as u64;
        let skipped = (sheet.skipped + sheet.rejected.len()) as u64;

        self.advance(
            job_id,
            JobUpdate::new()
                .progress(50.0)
                .records_processed(parsed)
                .metadata("rows_processed", total),
        )
        .await;

        let persisted = if sheet.records.is_empty() {
            info!(job_id, total, "Import produced no valid records");
            0
        } else {
            self.store.upsert(&sheet.records).await? as u64
        };
        self.metrics.records_persisted(persisted);

        let mut done = JobUpdate::new()
            .status(JobStatus::Completed)
            .progress(100.0)
            .records_processed(parsed)
            .metadata("rows_processed", total)
            .metadata("rows_added", persisted)
            .metadata("rows_skipped", skipped)
            .metadata("layout", json!(sheet.layout));
        if !sheet.rejected.is_empty() {
            let reported: Vec<_> = sheet
                .rejected
                .iter()
                .take(MAX_REPORTED_ROW_ERRORS)
                .collect();
            done = done.metadata("row_errors", json!(reported));
        }
        self.advance(job_id, done).await;

        info!(job_id, total, parsed, persisted, skipped, "Import job completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{ImportParams, JobRequest};
    use crate::jobs::JobStatus;
    use crate::storage::upload_key;
    use crate::store::PerformanceStore;
    use std::sync::Arc;

    async fn run_upload(h: &Harness, ext: &str, body: impl AsRef<[u8]>) -> JobStatus {
        let key = upload_key("p1", "upload_1", ext);
        h.uploads.upload(&key, body.as_ref().to_vec()).await.unwrap();

        let request = JobRequest::Import(ImportParams {
            profile_id: "p1".to_string(),
            upload_id: "upload_1".to_string(),
            upload_key: key,
            start_date: None,
            end_date: None,
        });
        h.registry
            .create("import-1", request.kind(), request.metadata())
            .await
            .unwrap();
        h.pipeline.run("import-1", &request).await
    }

    #[tokio::test]
    async fn import_persists_parsed_rows() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));
        let csv = "keyword_id,date,impressions,clicks,spend,sales,orders\n\
                   1,2025-11-01,100,3,1.5,9,1\n\
                   2,2025-11-01,0,0,0,0,0\n\
                   3,bad-date,10,1,1,1,0\n";

        assert_eq!(run_upload(&h, "csv", csv).await, JobStatus::Completed);

        let job = h.registry.get("import-1").await.unwrap();
        assert_eq!(job.records_processed, 1);
        assert_eq!(job.metadata_u64("rows_processed"), 3);
        assert_eq!(job.metadata_u64("rows_added"), 1);
        assert_eq!(job.metadata_u64("rows_skipped"), 2);
        assert_eq!(job.metadata["row_errors"][0]["row"], 4);
        assert_eq!(h.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_valid_rows_completes_with_zero() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));
        let csv = "keyword_id,date,impressions,clicks\n1,2025-11-01,0,0\n";

        assert_eq!(run_upload(&h, "csv", csv).await, JobStatus::Completed);

        let job = h.registry.get("import-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.records_processed, 0);
        assert_eq!(job.progress, 100.0);
        assert!(job.errors.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_layout_fails_job() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));

        assert_eq!(run_upload(&h, "csv", "a,b\n1,2\n").await, JobStatus::Failed);

        let job = h.registry.get("import-1").await.unwrap();
        assert!(job.errors[0].contains("layout"));
    }

    #[tokio::test]
    async fn excel_upload_is_imported() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in ["keyword_id", "date", "impressions", "clicks"].iter().enumerate() {
            sheet.write_string(0, col as u16, *name).unwrap();
        }
        sheet.write_string(1, 0, "7").unwrap();
        sheet.write_string(1, 1, "2025-11-01").unwrap();
        sheet.write_number(1, 2, 40.0).unwrap();
        sheet.write_number(1, 3, 2.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        assert_eq!(run_upload(&h, "xlsx", bytes).await, JobStatus::Completed);
        assert_eq!(h.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupt_workbook_fails_job() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));

        assert_eq!(run_upload(&h, "xlsx", "PK").await, JobStatus::Failed);

        let job = h.registry.get("import-1").await.unwrap();
        assert!(job.errors[0].contains("Excel"));
    }

    #[tokio::test]
    async fn missing_upload_fails_job() {
        let h = harness(Arc::new(FakeReports::Rows(Vec::new())));
        let request = JobRequest::Import(ImportParams {
            profile_id: "p1".to_string(),
            upload_id: "gone".to_string(),
            upload_key: "uploads/p1/gone.csv".to_string(),
            start_date: None,
            end_date: None,
        });
        h.registry
            .create("import-2", request.kind(), request.metadata())
            .await
            .unwrap();

        assert_eq!(h.pipeline.run("import-2", &request).await, JobStatus::Failed);
    }
}

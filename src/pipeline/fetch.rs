use tracing::{info, warn};

use super::{FetchParams, IngestionPipeline, Result};
use crate::ads::ReportRequest;
use crate::jobs::{JobStatus, JobUpdate};
use crate::records::map_report_record;

impl IngestionPipeline {
    pub(super) async fn run_fetch(&self, job_id: &str, params: &FetchParams) -> Result<()> {
        let report_type = params
            .report_type
            .clone()
            .unwrap_or_else(|| self.settings.report_type.clone());
        let request = ReportRequest::new(
            params.profile_id.clone(),
            report_type,
            params.start_date,
            params.end_date,
        );

        self.advance(job_id, JobUpdate::new().progress(10.0)).await;

        let raw = self
            .reports
            .fetch_report(request, self.settings.max_wait)
            .await?;
        let fetched = raw.len() as u64;

        self.advance(
            job_id,
            JobUpdate::new().progress(60.0).records_processed(fetched),
        )
        .await;

        let mut records = Vec::with_capacity(raw.len());
        let mut skipped = 0u64;
        for (index, row) in raw.iter().enumerate() {
            match map_report_record(row, &params.profile_id, params.end_date) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(job_id, index, error = %e, "Dropping unparsable report record");
                }
            }
        }

        self.advance(job_id, JobUpdate::new().progress(80.0)).await;

        let persisted = if records.is_empty() {
            0
        } else {
            self.store.upsert(&records).await? as u64
        };
        self.metrics.records_persisted(persisted);

        self.advance(
            job_id,
            JobUpdate::new()
                .status(JobStatus::Completed)
                .progress(100.0)
                .records_processed(fetched)
                .metadata("records_persisted", persisted)
                .metadata("records_skipped", skipped),
        )
        .await;

        info!(job_id, fetched, persisted, skipped, "Fetch job completed");
        Ok(())
    }
}

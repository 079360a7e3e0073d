use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Owner-supplied context attached to a job (profile id, date range, upload ref...)
pub type JobMetadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Fetch,
    Import,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Fetch => "fetch",
            JobKind::Import => "import",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fetch" => Ok(JobKind::Fetch),
            "import" => Ok(JobKind::Import),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

/// Job lifecycle: `pending -> in_progress -> {completed | failed | timeout}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout
        )
    }

    /// Whether a record in `self` may be moved to `next`.
    ///
    /// Re-applying the current status is always allowed (in_progress self-loop,
    /// repeated terminal updates). Nothing leaves a terminal state and nothing
    /// returns to pending.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next != JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Tracked state of one ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Percentage in [0, 100], non-decreasing within a run
    pub progress: f64,
    pub records_processed: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JobMetadata,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, kind: JobKind, metadata: JobMetadata) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            status: JobStatus::Pending,
            progress: 0.0,
            records_processed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            metadata,
        }
    }

    pub fn metadata_u64(&self, key: &str) -> u64 {
        self.metadata.get(key).and_then(Value::as_u64).unwrap_or(0)
    }
}

/// Partial update applied through [`JobRegistry::update`](super::JobRegistry::update)
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub records_processed: Option<u64>,
    pub error: Option<String>,
    pub metadata: JobMetadata,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn records_processed(mut self, count: u64) -> Self {
        self.records_processed = Some(count);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Build a job id such as `fetch_20251215_101530_3f9c2a1b`
pub fn generate_job_id(kind: JobKind) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", kind, timestamp, &unique[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Timeout] {
            assert!(terminal.is_terminal());
            assert!(terminal.can_transition_to(terminal));
            assert!(!terminal.can_transition_to(JobStatus::InProgress));
            assert!(!terminal.can_transition_to(JobStatus::Pending));
        }
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn running_job_cannot_return_to_pending() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::InProgress.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn job_id_has_kind_prefix() {
        let id = generate_job_id(JobKind::Import);
        assert!(id.starts_with("import_"));
        assert_eq!(id.split('_').count(), 4);
        assert_ne!(id, generate_job_id(JobKind::Import));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!("Fetch".parse::<JobKind>().unwrap(), JobKind::Fetch);
        assert!("optimize".parse::<JobKind>().is_err());
    }
}

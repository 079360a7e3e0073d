use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdsError {
    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("report {report_id} failed with status {status}")]
    RemoteFailure { report_id: String, status: String },

    #[error("report {report_id} did not complete within {}s", waited.as_secs())]
    Timeout { report_id: String, waited: Duration },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AdsError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AdsError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdsError::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            AdsError::InvalidResponse(err.to_string())
        } else {
            AdsError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AdsError>;

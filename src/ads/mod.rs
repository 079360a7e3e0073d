//! Remote ads report API: OAuth token handling and the report lifecycle
//! (request, poll, download).

mod client;
mod error;
mod models;
mod token;

pub use client::{AdsClientConfig, ReportClient};
pub use error::{AdsError, Result};
pub use models::{AccessToken, DEFAULT_METRICS, ReportHandle, ReportRequest, ReportStatus};
pub use token::{Credentials, TOKEN_SAFETY_MARGIN_SECS, TokenManager};

use async_trait::async_trait;
use std::time::Duration;

use crate::records::RawRecord;

/// Anything that can produce the raw rows of a finished report
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Generate a report and return its rows once ready.
    ///
    /// Fails with [`AdsError::Timeout`] when the report is not ready within
    /// `max_wait`.
    async fn fetch_report(&self, request: ReportRequest, max_wait: Duration)
    -> Result<Vec<RawRecord>>;
}

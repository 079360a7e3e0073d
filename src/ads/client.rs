//! Authenticated client for the remote report API

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::io::Read;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ReportSource;
use super::error::{AdsError, Result};
use super::models::{
    CreateReportBody, CreateReportResponse, ReportHandle, ReportRequest, ReportStatus,
    ReportStatusResponse,
};
use super::token::{Credentials, TokenManager};
use crate::records::RawRecord;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Report client configuration
#[derive(Debug, Clone)]
pub struct AdsClientConfig {
    pub api_base: String,
    pub auth_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub user_agent: String,
}

impl Default for AdsClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://advertising-api.amazon.com".to_string(),
            auth_url: "https://api.amazon.com/auth/o2/token".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            user_agent: concat!("adsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Requests, polls and downloads keyword performance reports
pub struct ReportClient {
    http: Client,
    api_base: String,
    poll_interval: Duration,
    tokens: TokenManager,
}

impl ReportClient {
    /// Create a new report client
    pub fn new(config: AdsClientConfig, credentials: Option<Credentials>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AdsError::Transport(e.to_string()))?;

        Ok(Self {
            tokens: TokenManager::new(http.clone(), config.auth_url, credentials),
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Ask the remote system to start generating a report
    pub async fn request_report(&self, request: &ReportRequest) -> Result<ReportHandle> {
        let url = format!("{}/v2/sp/keywords/report", self.api_base);
        let body = CreateReportBody::from_request(request);

        let response = self
            .authorized(self.http.post(&url), &request.profile_id)
            .await?
            .json(&body)
            .send()
            .await
            .map_err(AdsError::from_reqwest)?;
        let response = self.check(response).await?;

        let created: CreateReportResponse = response.json().await.map_err(AdsError::from_reqwest)?;
        let report_id = created
            .report_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AdsError::InvalidResponse("report creation returned no reportId".into()))?;

        info!(
            report_id = %report_id,
            profile_id = %request.profile_id,
            start = %request.start_date,
            end = %request.end_date,
            "Report requested"
        );
        Ok(ReportHandle(report_id))
    }

    /// Poll until the report is ready and return its download location.
    ///
    /// Each sleep counts against `max_wait`; once the budget is spent the
    /// loop gives up even if the next poll would have succeeded.
    pub async fn wait_for_report(
        &self,
        profile_id: &str,
        handle: &ReportHandle,
        max_wait: Duration,
    ) -> Result<String> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let state = self.report_status(profile_id, handle).await?;

            match ReportStatus::classify(state.status.as_deref()) {
                ReportStatus::Success => {
                    debug!(report_id = %handle, polls, "Report ready");
                    return state.location.filter(|l| !l.is_empty()).ok_or_else(|| {
                        AdsError::InvalidResponse(format!(
                            "report {} succeeded without a download location",
                            handle
                        ))
                    });
                }
                ReportStatus::Failure(status) => {
                    warn!(report_id = %handle, status = %status, "Report generation failed");
                    return Err(AdsError::RemoteFailure {
                        report_id: handle.to_string(),
                        status,
                    });
                }
                ReportStatus::InProgress => {
                    debug!(report_id = %handle, polls, "Report in progress");
                }
                ReportStatus::Unknown(status) => {
                    warn!(report_id = %handle, status = %status, "Unknown report status, polling again");
                }
            }

            let remaining = max_wait.saturating_sub(started.elapsed());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;

            let waited = started.elapsed();
            if waited >= max_wait {
                warn!(report_id = %handle, polls, waited_secs = waited.as_secs(), "Report wait timed out");
                return Err(AdsError::Timeout {
                    report_id: handle.to_string(),
                    waited,
                });
            }
        }
    }

    /// Download a finished report and decode its rows
    pub async fn download(&self, profile_id: &str, location: &str) -> Result<Vec<RawRecord>> {
        let response = self
            .authorized(self.http.get(location), profile_id)
            .await?
            .send()
            .await
            .map_err(AdsError::from_reqwest)?;
        let response = self.check(response).await?;

        let bytes = response.bytes().await.map_err(AdsError::from_reqwest)?;
        let records = decode_artifact(&bytes)?;

        debug!(size = bytes.len(), records = records.len(), "Report downloaded");
        Ok(records)
    }

    async fn report_status(
        &self,
        profile_id: &str,
        handle: &ReportHandle,
    ) -> Result<ReportStatusResponse> {
        let url = format!("{}/v2/reports/{}", self.api_base, handle);
        let response = self
            .authorized(self.http.get(&url), profile_id)
            .await?
            .send()
            .await
            .map_err(AdsError::from_reqwest)?;
        let response = self.check(response).await?;

        response.json().await.map_err(AdsError::from_reqwest)
    }

    async fn authorized(&self, builder: RequestBuilder, profile_id: &str) -> Result<RequestBuilder> {
        let token = self.tokens.get_token().await?;
        let client_id = &self.tokens.credentials()?.client_id;

        Ok(builder
            .bearer_auth(token.value)
            .header("Amazon-Advertising-API-ClientId", client_id)
            .header("Amazon-Advertising-API-Scope", profile_id))
    }

    /// Map non-success responses onto the error taxonomy
    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.tokens.invalidate().await;
            return Err(AdsError::Auth(format!(
                "request rejected with HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Err(AdsError::Transport(format!(
            "HTTP {}: {}",
            status.as_u16(),
            if snippet.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                snippet
            }
        )))
    }
}

#[async_trait]
impl ReportSource for ReportClient {
    async fn fetch_report(
        &self,
        request: ReportRequest,
        max_wait: Duration,
    ) -> Result<Vec<RawRecord>> {
        let handle = self.request_report(&request).await?;
        let location = self
            .wait_for_report(&request.profile_id, &handle, max_wait)
            .await?;
        self.download(&request.profile_id, &location).await
    }
}

/// Decode a report artifact, inflating it first when gzip-compressed
fn decode_artifact(bytes: &Bytes) -> Result<Vec<RawRecord>> {
    let json = if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes.as_ref())
            .read_to_end(&mut inflated)
            .map_err(|e| AdsError::InvalidResponse(format!("corrupt gzip artifact: {}", e)))?;
        inflated
    } else {
        bytes.to_vec()
    };

    serde_json::from_slice(&json)
        .map_err(|e| AdsError::InvalidResponse(format!("report artifact is not a JSON array of rows: {}", e)))
}

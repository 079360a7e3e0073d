//! Request and response shapes for the remote ads API.
//!
//! The remote payloads are versioned by the ads platform, so every response
//! type ignores unknown fields and defaults the optional ones.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Metrics requested when the caller does not name any
pub const DEFAULT_METRICS: &[&str] = &[
    "impressions",
    "clicks",
    "cost",
    "attributedConversions14d",
    "attributedSales14d",
    "attributedUnitsOrdered14d",
];

/// OAuth access token with its absolute expiry
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Usable only while `now < expires_at - margin`
    pub fn is_usable(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now < self.expires_at - margin
    }
}

/// What to ask the remote system to generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    /// Profile the report is scoped to
    pub profile_id: String,
    pub report_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: Vec<String>,
}

impl ReportRequest {
    /// Request with the default keyword metrics
    pub fn new(
        profile_id: impl Into<String>,
        report_type: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            report_type: report_type.into(),
            start_date,
            end_date,
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Opaque id of a report being generated remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHandle(pub String);

impl std::fmt::Display for ReportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenGrant<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateReportBody {
    pub report_date: String,
    pub metrics: String,
    pub configuration: ReportConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportConfiguration {
    pub ad_product: &'static str,
    pub group_by: Vec<&'static str>,
    pub columns: Vec<String>,
    pub report_type_id: String,
    pub time_unit: &'static str,
    pub format: &'static str,
}

impl CreateReportBody {
    pub fn from_request(request: &ReportRequest) -> Self {
        Self {
            report_date: request.end_date.format("%Y-%m-%d").to_string(),
            metrics: request.metrics.join(","),
            configuration: ReportConfiguration {
                ad_product: "SPONSORED_PRODUCTS",
                group_by: vec!["keyword"],
                columns: request.metrics.clone(),
                report_type_id: request.report_type.clone(),
                time_unit: "SUMMARY",
                format: "JSON",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateReportResponse {
    pub report_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "url")]
    pub location: Option<String>,
}

/// Remote report state, classified from the raw status string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Success,
    Failure(String),
    InProgress,
    Unknown(String),
}

impl ReportStatus {
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return ReportStatus::Unknown(String::new());
        };
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "COMPLETED" => ReportStatus::Success,
            "FAILURE" | "FAILED" | "CANCELLED" => ReportStatus::Failure(raw.to_string()),
            "IN_PROGRESS" | "PENDING" | "PROCESSING" => ReportStatus::InProgress,
            _ => ReportStatus::Unknown(raw.to_string()),
        }
    }
}

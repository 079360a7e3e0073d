//! Canonical performance records shared by both ingestion paths.
//!
//! Report rows from the ads API and spreadsheet rows from uploads are both
//! normalized into [`CanonicalPerformanceRecord`] before they reach a
//! [`PerformanceStore`](crate::store::PerformanceStore).

mod mapping;

pub use mapping::{RawRecord, RecordError, map_report_record};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a record entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Api,
    Upload,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Api => f.write_str("api"),
            DataSource::Upload => f.write_str("upload"),
        }
    }
}

/// Normalized keyword performance row for one keyword, profile and day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPerformanceRecord {
    pub profile_id: String,
    pub keyword_id: String,
    pub keyword_text: String,
    pub match_type: String,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub ad_group_id: Option<String>,
    pub ad_group_name: Option<String>,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub sales: f64,
    pub orders: u64,
    pub units: u64,
    pub bid: Option<f64>,
    pub state: String,
    pub source: DataSource,
}

impl CanonicalPerformanceRecord {
    pub fn key(&self) -> PerformanceKey {
        PerformanceKey {
            keyword_id: self.keyword_id.clone(),
            profile_id: self.profile_id.clone(),
            date: self.date,
        }
    }
}

/// Identity under which a record is upserted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PerformanceKey {
    pub keyword_id: String,
    pub profile_id: String,
    pub date: NaiveDate,
}

#[cfg(test)]
pub(crate) fn sample_record(keyword_id: &str, profile_id: &str, day: u32) -> CanonicalPerformanceRecord {
    CanonicalPerformanceRecord {
        profile_id: profile_id.to_string(),
        keyword_id: keyword_id.to_string(),
        keyword_text: "running shoes".to_string(),
        match_type: "EXACT".to_string(),
        campaign_id: Some("c-1".to_string()),
        campaign_name: Some("Shoes".to_string()),
        ad_group_id: None,
        ad_group_name: None,
        date: NaiveDate::from_ymd_opt(2025, 11, day).unwrap(),
        impressions: 100,
        clicks: 5,
        spend: 2.5,
        sales: 20.0,
        orders: 1,
        units: 1,
        bid: Some(0.75),
        state: "ENABLED".to_string(),
        source: DataSource::Api,
    }
}

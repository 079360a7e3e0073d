//! Read-side aggregations over stored performance rows: profile summary,
//! per-keyword totals, time trends and a breakdown by data source.
//!
//! Ratios are percentages (ACoS, CTR, conversion rate) or plain multiples
//! (ROAS, CPC), rounded to two decimals, and `None` when the denominator is zero.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::records::{CanonicalPerformanceRecord, DataSource};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator * scale`, or `None` for a zero denominator
fn ratio(numerator: f64, denominator: f64, scale: f64) -> Option<f64> {
    (denominator > 0.0).then(|| round2(numerator / denominator * scale))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_spend: f64,
    pub total_sales: f64,
    pub total_orders: u64,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub avg_acos: Option<f64>,
    pub avg_roas: Option<f64>,
    pub avg_ctr: Option<f64>,
    /// Distinct keyword ids
    pub keyword_count: usize,
}

pub fn summarize(records: &[CanonicalPerformanceRecord]) -> PerformanceSummary {
    let mut summary = PerformanceSummary::default();
    let mut keywords = HashSet::new();
    for record in records {
        summary.total_spend += record.spend;
        summary.total_sales += record.sales;
        summary.total_orders += record.orders;
        summary.total_impressions += record.impressions;
        summary.total_clicks += record.clicks;
        keywords.insert(record.keyword_id.as_str());
    }
    summary.total_spend = round2(summary.total_spend);
    summary.total_sales = round2(summary.total_sales);
    summary.avg_acos = ratio(summary.total_spend, summary.total_sales, 100.0);
    summary.avg_roas = ratio(summary.total_sales, summary.total_spend, 1.0);
    summary.avg_ctr = ratio(
        summary.total_clicks as f64,
        summary.total_impressions as f64,
        100.0,
    );
    summary.keyword_count = keywords.len();
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordSort {
    Spend,
    Sales,
    Clicks,
    Impressions,
    Acos,
}

impl FromStr for KeywordSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spend" => Ok(KeywordSort::Spend),
            "sales" => Ok(KeywordSort::Sales),
            "clicks" => Ok(KeywordSort::Clicks),
            "impressions" => Ok(KeywordSort::Impressions),
            "acos" => Ok(KeywordSort::Acos),
            other => Err(format!(
                "invalid sort_by '{}', expected spend, sales, clicks, impressions or acos",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort_order '{}', expected asc or desc", other)),
        }
    }
}

/// One keyword's totals over the queried range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPerformance {
    pub keyword_id: String,
    pub keyword_text: String,
    pub match_type: String,
    pub campaign_name: Option<String>,
    pub ad_group_name: Option<String>,
    pub state: String,
    pub bid: Option<f64>,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub sales: f64,
    pub orders: u64,
    pub cpc: Option<f64>,
    pub ctr: Option<f64>,
    pub acos: Option<f64>,
    pub roas: Option<f64>,
    pub conversion_rate: Option<f64>,
}

impl KeywordPerformance {
    /// Descriptive fields come from the first (earliest) row seen
    fn start(record: &CanonicalPerformanceRecord) -> Self {
        Self {
            keyword_id: record.keyword_id.clone(),
            keyword_text: record.keyword_text.clone(),
            match_type: record.match_type.clone(),
            campaign_name: None,
            ad_group_name: None,
            state: record.state.clone(),
            bid: None,
            impressions: 0,
            clicks: 0,
            spend: 0.0,
            sales: 0.0,
            orders: 0,
            cpc: None,
            ctr: None,
            acos: None,
            roas: None,
            conversion_rate: None,
        }
    }

    fn add(&mut self, record: &CanonicalPerformanceRecord) {
        self.impressions += record.impressions;
        self.clicks += record.clicks;
        self.spend += record.spend;
        self.sales += record.sales;
        self.orders += record.orders;
        // later rows carry the current state and bid
        self.state.clone_from(&record.state);
        if record.bid.is_some() {
            self.bid = record.bid;
        }
        if record.campaign_name.is_some() {
            self.campaign_name.clone_from(&record.campaign_name);
        }
        if record.ad_group_name.is_some() {
            self.ad_group_name.clone_from(&record.ad_group_name);
        }
        if self.keyword_text.is_empty() {
            self.keyword_text.clone_from(&record.keyword_text);
        }
    }

    fn finish(mut self) -> Self {
        self.spend = round2(self.spend);
        self.sales = round2(self.sales);
        let clicks = self.clicks as f64;
        self.cpc = ratio(self.spend, clicks, 1.0);
        self.ctr = ratio(clicks, self.impressions as f64, 100.0);
        self.acos = ratio(self.spend, self.sales, 100.0);
        self.roas = ratio(self.sales, self.spend, 1.0);
        self.conversion_rate = ratio(self.orders as f64, clicks, 100.0);
        self
    }

    fn sort_value(&self, sort: KeywordSort) -> Option<f64> {
        match sort {
            KeywordSort::Spend => Some(self.spend),
            KeywordSort::Sales => Some(self.sales),
            KeywordSort::Clicks => Some(self.clicks as f64),
            KeywordSort::Impressions => Some(self.impressions as f64),
            KeywordSort::Acos => self.acos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordQuery {
    pub sort_by: KeywordSort,
    pub sort_order: SortOrder,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl Default for KeywordQuery {
    fn default() -> Self {
        Self {
            sort_by: KeywordSort::Spend,
            sort_order: SortOrder::Desc,
            page: 1,
            page_size: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordPage {
    pub keywords: Vec<KeywordPerformance>,
    /// Keywords across all pages
    pub total_count: usize,
}

/// Per-keyword totals, sorted and paginated.
///
/// Keywords without a value for the sort field (ACoS with no sales) sort
/// last in either order; ties fall back to keyword id.
pub fn keyword_performance(records: &[CanonicalPerformanceRecord], query: KeywordQuery) -> KeywordPage {
    let mut by_keyword: HashMap<&str, KeywordPerformance> = HashMap::new();
    for record in records {
        by_keyword
            .entry(record.keyword_id.as_str())
            .or_insert_with(|| KeywordPerformance::start(record))
            .add(record);
    }

    let mut keywords: Vec<KeywordPerformance> =
        by_keyword.into_values().map(KeywordPerformance::finish).collect();
    keywords.sort_by(|a, b| {
        let by_value = match (a.sort_value(query.sort_by), b.sort_value(query.sort_by)) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                match query.sort_order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_value.then_with(|| a.keyword_id.cmp(&b.keyword_id))
    });

    let total_count = keywords.len();
    let offset = query.page.saturating_sub(1).saturating_mul(query.page_size);
    let keywords = keywords
        .into_iter()
        .skip(offset)
        .take(query.page_size)
        .collect();

    KeywordPage {
        keywords,
        total_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendGrouping {
    Day,
    Week,
    Month,
}

impl TrendGrouping {
    /// First day of the period containing `date`; weeks start on Monday
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            TrendGrouping::Day => date,
            TrendGrouping::Week => date
                .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
                .unwrap_or(date),
            TrendGrouping::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

impl FromStr for TrendGrouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(TrendGrouping::Day),
            "week" => Ok(TrendGrouping::Week),
            "month" => Ok(TrendGrouping::Month),
            other => Err(format!(
                "invalid group_by '{}', expected day, week or month",
                other
            )),
        }
    }
}

impl fmt::Display for TrendGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendGrouping::Day => f.write_str("day"),
            TrendGrouping::Week => f.write_str("week"),
            TrendGrouping::Month => f.write_str("month"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Start of the period
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub sales: f64,
    pub orders: u64,
    pub acos: Option<f64>,
    pub roas: Option<f64>,
    pub ctr: Option<f64>,
}

/// Totals per period, oldest first; periods without rows are left out
pub fn trends(records: &[CanonicalPerformanceRecord], grouping: TrendGrouping) -> Vec<TrendPoint> {
    let mut periods: BTreeMap<NaiveDate, TrendPoint> = BTreeMap::new();
    for record in records {
        let date = grouping.period_start(record.date);
        let point = periods.entry(date).or_insert_with(|| TrendPoint {
            date,
            impressions: 0,
            clicks: 0,
            spend: 0.0,
            sales: 0.0,
            orders: 0,
            acos: None,
            roas: None,
            ctr: None,
        });
        point.impressions += record.impressions;
        point.clicks += record.clicks;
        point.spend += record.spend;
        point.sales += record.sales;
        point.orders += record.orders;
    }

    periods
        .into_values()
        .map(|mut point| {
            point.spend = round2(point.spend);
            point.sales = round2(point.sales);
            point.acos = ratio(point.spend, point.sales, 100.0);
            point.roas = ratio(point.sales, point.spend, 1.0);
            point.ctr = ratio(point.clicks as f64, point.impressions as f64, 100.0);
            point
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub source: DataSource,
    pub record_count: usize,
    /// Earliest and latest row dates from this source
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSources {
    pub sources: Vec<SourceBreakdown>,
    pub total_records: usize,
    pub api_records: usize,
    pub upload_records: usize,
}

/// Row counts per ingestion path; sources with no rows are omitted
pub fn data_sources(records: &[CanonicalPerformanceRecord]) -> DataSources {
    let mut result = DataSources::default();
    for source in [DataSource::Api, DataSource::Upload] {
        let mut rows = records.iter().filter(|r| r.source == source);
        let Some(first) = rows.next() else {
            continue;
        };
        let mut breakdown = SourceBreakdown {
            source,
            record_count: 1,
            first_date: first.date,
            last_date: first.date,
        };
        for row in rows {
            breakdown.record_count += 1;
            breakdown.first_date = breakdown.first_date.min(row.date);
            breakdown.last_date = breakdown.last_date.max(row.date);
        }

        match source {
            DataSource::Api => result.api_records = breakdown.record_count,
            DataSource::Upload => result.upload_records = breakdown.record_count,
        }
        result.total_records += breakdown.record_count;
        result.sources.push(breakdown);
    }
    result
}

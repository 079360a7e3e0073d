use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{CanonicalPerformanceRecord, DataSource};

/// One row of a downloaded report, as delivered by the remote API
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a valid {expected}: {value}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Map a raw report row onto the canonical shape.
///
/// `keywordId` is required. Metrics default to zero when absent but reject the
/// row when present with a non-numeric value. Unknown fields are ignored.
pub fn map_report_record(
    raw: &RawRecord,
    profile_id: &str,
    report_date: NaiveDate,
) -> Result<CanonicalPerformanceRecord, RecordError> {
    let keyword_id = identifier(raw, "keywordId")?.ok_or(RecordError::MissingField("keywordId"))?;

    Ok(CanonicalPerformanceRecord {
        profile_id: profile_id.to_string(),
        keyword_id,
        keyword_text: text(raw, "keywordText").unwrap_or_default(),
        match_type: text(raw, "matchType").unwrap_or_else(|| "UNKNOWN".to_string()),
        campaign_id: identifier(raw, "campaignId")?,
        campaign_name: text(raw, "campaignName"),
        ad_group_id: identifier(raw, "adGroupId")?,
        ad_group_name: text(raw, "adGroupName"),
        date: report_date,
        impressions: count(raw, "impressions")?,
        clicks: count(raw, "clicks")?,
        spend: amount(raw, "cost")?.unwrap_or(0.0),
        sales: amount(raw, "attributedSales14d")?.unwrap_or(0.0),
        orders: count(raw, "attributedConversions14d")?,
        units: count(raw, "attributedUnitsOrdered14d")?,
        bid: amount(raw, "bid")?.filter(|bid| *bid > 0.0),
        state: text(raw, "state").unwrap_or_else(|| "UNKNOWN".to_string()),
        source: DataSource::Api,
    })
}

fn present<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    raw.get(field).filter(|value| !value.is_null())
}

fn text(raw: &RawRecord, field: &str) -> Option<String> {
    present(raw, field).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Ids arrive as numbers or strings depending on the report version
fn identifier(raw: &RawRecord, field: &'static str) -> Result<Option<String>, RecordError> {
    match present(raw, field) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(invalid(field, "identifier", other.to_string())),
    }
}

fn amount(raw: &RawRecord, field: &'static str) -> Result<Option<f64>, RecordError> {
    match present(raw, field) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, "number", n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(field, "number", s.clone())),
        Some(other) => Err(invalid(field, "number", other.to_string())),
    }
}

fn count(raw: &RawRecord, field: &'static str) -> Result<u64, RecordError> {
    let Some(value) = amount(raw, field)? else {
        return Ok(0);
    };
    if value < 0.0 || !value.is_finite() {
        return Err(RecordError::InvalidField {
            field,
            expected: "non-negative count",
            value: value.to_string(),
        });
    }
    Ok(value.trunc() as u64)
}

fn invalid(field: &'static str, expected: &'static str, value: String) -> RecordError {
    RecordError::InvalidField {
        field,
        expected,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()
    }

    #[test]
    fn maps_full_report_row() {
        let row = raw(json!({
            "keywordId": 123456789,
            "keywordText": "trail shoes",
            "matchType": "PHRASE",
            "campaignId": 77,
            "campaignName": "Trail",
            "adGroupId": "88",
            "adGroupName": "Trail - exact",
            "impressions": 1200,
            "clicks": 31,
            "cost": 18.4,
            "attributedSales14d": "96.50",
            "attributedConversions14d": 3,
            "attributedUnitsOrdered14d": 4,
            "bid": 0.65,
            "state": "ENABLED",
            "someFutureField": {"nested": true}
        }));

        let record = map_report_record(&row, "profile-1", day()).unwrap();

        assert_eq!(record.keyword_id, "123456789");
        assert_eq!(record.profile_id, "profile-1");
        assert_eq!(record.campaign_id.as_deref(), Some("77"));
        assert_eq!(record.ad_group_id.as_deref(), Some("88"));
        assert_eq!(record.impressions, 1200);
        assert_eq!(record.sales, 96.5);
        assert_eq!(record.orders, 3);
        assert_eq!(record.units, 4);
        assert_eq!(record.bid, Some(0.65));
        assert_eq!(record.date, day());
        assert_eq!(record.source, DataSource::Api);
    }

    #[test]
    fn missing_metrics_default_to_zero() {
        let record = map_report_record(&raw(json!({"keywordId": "k1"})), "p", day()).unwrap();

        assert_eq!(record.impressions, 0);
        assert_eq!(record.spend, 0.0);
        assert_eq!(record.match_type, "UNKNOWN");
        assert_eq!(record.state, "UNKNOWN");
        assert_eq!(record.bid, None);
    }

    #[test]
    fn missing_keyword_id_is_rejected() {
        let err = map_report_record(&raw(json!({"clicks": 3})), "p", day()).unwrap_err();
        assert_eq!(err, RecordError::MissingField("keywordId"));
    }

    #[test]
    fn non_numeric_metric_is_rejected() {
        let err = map_report_record(
            &raw(json!({"keywordId": 1, "impressions": "lots"})),
            "p",
            day(),
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::InvalidField { field: "impressions", .. }));
    }

    #[test]
    fn negative_count_is_rejected() {
        let err = map_report_record(&raw(json!({"keywordId": 1, "clicks": -2})), "p", day())
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidField { field: "clicks", .. }));
    }
}

//! Key layout for the performance partition
//!
//! - `performance`: perf:{profile_id}:{keyword_id}:{YYYY-MM-DD} -> record (JSON)
//!
//! Profile first so one profile's rows form a contiguous prefix range.

use chrono::NaiveDate;

use crate::records::PerformanceKey;

/// Encode a record key: perf:{profile_id}:{keyword_id}:{date}
pub fn encode_performance_key(key: &PerformanceKey) -> Vec<u8> {
    format!(
        "perf:{}:{}:{}",
        key.profile_id,
        key.keyword_id,
        key.date.format("%Y-%m-%d")
    )
    .into_bytes()
}

/// Encode a profile prefix for range scans: perf:{profile_id}:
pub fn encode_profile_prefix(profile_id: &str) -> Vec<u8> {
    format!("perf:{}:", profile_id).into_bytes()
}

/// Decode a record key back into its parts.
///
/// Keyword ids may themselves contain `:`, so the date is split from the
/// right and the profile from the left.
pub fn decode_performance_key(key: &[u8]) -> Option<PerformanceKey> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix("perf:")?;
    let (rest, date) = rest.rsplit_once(':')?;
    let (profile_id, keyword_id) = rest.split_once(':')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;

    Some(PerformanceKey {
        keyword_id: keyword_id.to_string(),
        profile_id: profile_id.to_string(),
        date,
    })
}

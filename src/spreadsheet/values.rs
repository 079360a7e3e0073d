//! Lenient cell parsing for exported spreadsheets

use chrono::NaiveDate;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Placeholder cells that count as zero
fn is_blank(raw: &str) -> bool {
    matches!(raw.trim(), "" | "--" | "null" | "NULL")
}

/// Strip currency markers and thousands separators: "$1,234.50 USD" -> "1234.50"
fn clean_number(raw: &str) -> String {
    raw.trim()
        .replace('$', "")
        .replace("USD", "")
        .replace(',', "")
        .trim()
        .to_string()
}

pub fn parse_amount(raw: &str) -> Result<f64, String> {
    if is_blank(raw) {
        return Ok(0.0);
    }
    let cleaned = clean_number(raw);
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("'{}' is not a number", raw.trim())),
    }
}

/// Whole counts; "5.0" reads as 5
pub fn parse_count(raw: &str) -> Result<u64, String> {
    let value = parse_amount(raw)?;
    if value < 0.0 {
        return Err(format!("'{}' is negative", raw.trim()));
    }
    Ok(value.trunc() as u64)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let text = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| format!("unable to parse date from '{}'", text))
}

/// Stable numeric id for console exports, which carry no keyword id.
///
/// The first 12 hex digits of md5("{keyword}_{match type}") (both lowercased)
/// read as a decimal integer.
pub fn derive_keyword_id(keyword: &str, match_type: &str) -> String {
    let text = format!(
        "{}_{}",
        keyword.trim().to_lowercase(),
        match_type.trim().to_lowercase()
    );
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    // 12 hex digits always fit in a u64
    u64::from_str_radix(&digest[..12], 16)
        .map(|id| id.to_string())
        .unwrap_or(digest)
}

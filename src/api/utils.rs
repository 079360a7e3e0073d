//! Stateless request checks shared by the handlers.

use chrono::NaiveDate;

use crate::api::error::ApiError;
use crate::storage::{UPLOAD_EXTENSIONS, is_key_segment};

/// Parses the Content-Type of a JSON request body
///
/// Accepts `application/json` with or without a charset parameter and
/// rejects look-alikes such as `application/jsonp` or `text/json`.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Lower-cased extension of an uploaded file name, if it is an accepted one
pub fn upload_extension(filename: &str) -> Result<String, ApiError> {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ApiError::InvalidPayload(format!(
            "unsupported file type '{}', expected one of: {}",
            filename,
            UPLOAD_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Checks the declared part content type against the file extension.
/// Browsers often send `application/octet-stream`, which is always allowed.
pub fn check_upload_content_type(ext: &str, content_type: Option<&str>) -> Result<(), ApiError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let media_type: mime::Mime = raw
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid content type: {}", raw)))?;

    if media_type == mime::APPLICATION_OCTET_STREAM {
        return Ok(());
    }

    let essence = media_type.essence_str();
    let accepted = match ext {
        "csv" => matches!(
            essence,
            "text/csv" | "application/csv" | "text/plain" | "application/vnd.ms-excel"
        ),
        "xlsx" => essence == "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => essence == "application/vnd.ms-excel",
        _ => false,
    };

    if accepted {
        Ok(())
    } else {
        Err(ApiError::InvalidPayload(format!(
            "content type {} does not match a .{} file",
            essence, ext
        )))
    }
}

/// Rejects empty uploads and uploads above `max_size`
pub fn validate_upload_size(size: usize, max_size: u64) -> Result<(), ApiError> {
    if size == 0 {
        return Err(ApiError::InvalidPayload("uploaded file is empty".to_string()));
    }
    if size as u64 > max_size {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} bytes exceeds limit of {} bytes",
            size, max_size
        )));
    }
    Ok(())
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if start > end {
        return Err(ApiError::InvalidPayload(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }
    Ok(())
}

/// Trimmed, non-empty identifier made of ASCII alphanumerics, `-` and `_`.
/// Profile and upload ids become storage key segments.
pub fn require_identifier(field: &str, value: Option<&str>) -> Result<String, ApiError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidPayload(format!("{} is required", field)))?;

    if !is_key_segment(value) {
        return Err(ApiError::InvalidPayload(format!(
            "{} contains invalid characters: {}",
            field, value
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_content_type() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension("report.csv").unwrap(), "csv");
        assert_eq!(upload_extension("Report.XLSX").unwrap(), "xlsx");
        assert_eq!(upload_extension("legacy.xls").unwrap(), "xls");
        assert!(upload_extension("notes.txt").is_err());
        assert!(upload_extension("no_extension").is_err());
    }

    #[test]
    fn test_upload_content_type() {
        assert!(check_upload_content_type("csv", None).is_ok());
        assert!(check_upload_content_type("csv", Some("text/csv")).is_ok());
        assert!(check_upload_content_type("csv", Some("text/csv; charset=utf-8")).is_ok());
        assert!(check_upload_content_type("xlsx", Some("application/octet-stream")).is_ok());
        assert!(check_upload_content_type("csv", Some("image/png")).is_err());
        assert!(check_upload_content_type("xls", Some("text/csv")).is_err());
        assert!(check_upload_content_type("csv", Some("not a mime")).is_err());
    }

    #[test]
    fn test_validate_upload_size() {
        assert!(validate_upload_size(10, 10).is_ok());
        assert!(matches!(
            validate_upload_size(0, 10),
            Err(ApiError::InvalidPayload(_))
        ));
        assert!(matches!(
            validate_upload_size(11, 10),
            Err(ApiError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_date_range_and_identifiers() {
        assert!(validate_date_range(date("2025-11-01"), date("2025-11-01")).is_ok());
        assert!(validate_date_range(date("2025-11-02"), date("2025-11-01")).is_err());

        assert_eq!(require_identifier("profile_id", Some(" 42 ")).unwrap(), "42");
        assert_eq!(
            require_identifier("upload_id", Some("upload_20251108_093000_000001")).unwrap(),
            "upload_20251108_093000_000001"
        );
        assert!(require_identifier("profile_id", Some("  ")).is_err());
        assert!(require_identifier("profile_id", None).is_err());
        assert!(require_identifier("profile_id", Some("../etc")).is_err());
    }
}

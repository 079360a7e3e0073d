use super::models::Config;
use crate::storage::is_key_segment;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("fetch.max_wait_secs ({max_wait}) is shorter than one poll interval ({poll_interval})")]
    MaxWaitBelowPollInterval { max_wait: u64, poll_interval: u64 },

    #[error("Invalid {field} '{value}': only letters, digits, '-' and '_' are allowed")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// Validate the entire configuration.
///
/// Ads credentials are not checked here; fetch jobs fail with an auth
/// error at run time when they are missing.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_ads(config)?;
    validate_fetch(config)?;
    validate_workers(config)?;
    validate_retention(config)?;
    validate_server(config)?;
    Ok(())
}

fn validate_ads(config: &Config) -> Result<(), ValidationError> {
    check_url("ads.api_base", &config.ads.api_base)?;
    check_url("ads.auth_url", &config.ads.auth_url)?;
    if let Some(profile_id) = &config.ads.default_profile_id {
        if !is_key_segment(profile_id) {
            return Err(ValidationError::InvalidIdentifier {
                field: "ads.default_profile_id",
                value: profile_id.clone(),
            });
        }
    }
    non_zero("ads.request_timeout_secs", config.ads.request_timeout_secs)
}

fn check_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    let fetch = &config.fetch;
    non_zero("fetch.poll_interval_secs", fetch.poll_interval_secs)?;

    if fetch.max_wait_secs < fetch.poll_interval_secs {
        return Err(ValidationError::MaxWaitBelowPollInterval {
            max_wait: fetch.max_wait_secs,
            poll_interval: fetch.poll_interval_secs,
        });
    }
    if fetch.report_type.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "fetch.report_type",
        });
    }
    Ok(())
}

fn validate_workers(config: &Config) -> Result<(), ValidationError> {
    non_zero("workers.count", config.workers.count as u64)?;
    non_zero("workers.queue_size", config.workers.queue_size as u64)
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    non_zero(
        "retention.sweep_interval_secs",
        config.retention.sweep_interval_secs,
    )
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    non_zero("server.max_upload_bytes", config.server.max_upload_bytes.as_u64())
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::Zero { field });
    }
    Ok(())
}

use super::models::Config;
use crate::ads::Credentials;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "ADSYNC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/adsync.toml";
const ENV_PREFIX: &str = "ADSYNC";
const ENV_SEPARATOR: &str = "__";

pub const CLIENT_ID_VAR: &str = "AMAZON_ADS_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "AMAZON_ADS_CLIENT_SECRET";
pub const REFRESH_TOKEN_VAR: &str = "AMAZON_ADS_REFRESH_TOKEN";

/// Load configuration with priority (lowest first):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if it exists)
/// 3. `.env` file entries (via dotenvy)
/// 4. Process environment
pub fn load() -> Result<Config, ConfigError> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    config.ads.credentials = credentials_from(|name| env::var(name).ok());

    Ok(config)
}

/// Build credentials from a variable lookup; all three values must be present
/// and non-empty
pub fn credentials_from<F>(lookup: F) -> Option<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let credentials = Credentials {
        client_id: read(CLIENT_ID_VAR)?,
        client_secret: read(CLIENT_SECRET_VAR)?,
        refresh_token: read(REFRESH_TOKEN_VAR)?,
    };
    Some(credentials)
}

/// Load configuration from a specific path plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            path = %config_path.display(),
            "No configuration file, using defaults and environment overrides"
        );
    }

    // ADSYNC__FETCH__MAX_WAIT_SECS -> fetch.max_wait_secs
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

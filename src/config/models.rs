use crate::ads::{AdsClientConfig, Credentials};
use crate::humanize::ByteSize;
use crate::pipeline::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ads: AdsConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize::mb(100)
}

/// Remote advertising API endpoints and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdsConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default)]
    pub default_profile_id: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Loaded from environment only, never from the config file
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            auth_url: default_auth_url(),
            default_profile_id: None,
            request_timeout_secs: default_request_timeout_secs(),
            credentials: None,
        }
    }
}

fn default_api_base() -> String {
    "https://advertising-api.amazon.com".to_string()
}

fn default_auth_url() -> String {
    "https://api.amazon.com/auth/o2/token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Report polling behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_report_type")]
    pub report_type: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            report_type: default_report_type(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_report_type() -> String {
    "KEYWORDS".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_size() -> usize {
    100
}

/// Job registry retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_keep_last_n")]
    pub keep_last_n: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last_n: default_keep_last_n(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_keep_last_n() -> usize {
    100
}

fn default_sweep_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadBackend {
    #[default]
    Memory,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceBackend {
    #[default]
    Memory,
    Fjall,
}

/// Where uploads and performance records live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub uploads: UploadBackend,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default)]
    pub performance: PerformanceBackend,
    #[serde(default = "default_performance_path")]
    pub performance_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads: UploadBackend::default(),
            uploads_dir: default_uploads_dir(),
            performance: PerformanceBackend::default(),
            performance_path: default_performance_path(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_performance_path() -> PathBuf {
    PathBuf::from("data/performance")
}

impl Config {
    pub fn ads_client(&self) -> AdsClientConfig {
        AdsClientConfig {
            api_base: self.ads.api_base.clone(),
            auth_url: self.ads.auth_url.clone(),
            request_timeout: Duration::from_secs(self.ads.request_timeout_secs),
            poll_interval: Duration::from_secs(self.fetch.poll_interval_secs),
            ..AdsClientConfig::default()
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_wait: Duration::from_secs(self.fetch.max_wait_secs),
            report_type: self.fetch.report_type.clone(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_secs)
    }

    /// Configuration rendered as TOML, credentials reduced to a presence flag
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        let mut rendered = toml::to_string_pretty(self)?;
        let state = if self.ads.credentials.is_some() {
            "configured (redacted)"
        } else {
            "missing"
        };
        rendered.push_str(&format!("\n# ads credentials: {}\n", state));
        Ok(rendered)
    }
}
